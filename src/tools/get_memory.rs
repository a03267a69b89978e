use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetMemoryParams {
    #[schemars(description = "ID of the memory to fetch")]
    pub memory_id: String,

    #[schemars(description = "Include outgoing relations. Defaults to true.")]
    pub include_links: Option<bool>,

    #[schemars(description = "Include the audit log. Defaults to false.")]
    pub include_log: Option<bool>,
}
