use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateMemoryParams {
    #[schemars(description = "ID of the memory to update")]
    pub memory_id: String,

    #[schemars(
        description = "Replacement content. The embedding is recomputed when this is set."
    )]
    pub content: Option<String>,

    #[schemars(description = "Replacement tag set (replaces all existing tags)")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "New memory kind")]
    pub kind: Option<String>,
}
