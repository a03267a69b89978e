use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreMemoryParams {
    #[schemars(description = "The natural language content of the memory (Markdown allowed)")]
    pub content: String,

    #[schemars(
        description = "Memory kind: 'insight', 'success', 'failure', 'decision', or 'note'. Custom kinds are accepted. Defaults to 'insight'."
    )]
    pub kind: Option<String>,

    #[schemars(description = "Context/project this memory belongs to. Created on first use.")]
    pub context: Option<String>,

    #[schemars(description = "Tags for this memory (normalized lowercase, max 20)")]
    pub tags: Option<Vec<String>>,

    #[schemars(
        description = "Explicit frustration score 0.0-1.0. When omitted it is estimated from the content."
    )]
    pub frustration: Option<f64>,

    #[schemars(description = "Time spent on the underlying problem, in hours")]
    pub time_cost_hours: Option<f64>,
}
