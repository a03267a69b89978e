use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UnlinkMemoriesParams {
    #[schemars(description = "ID of the source memory")]
    pub source_id: String,

    #[schemars(description = "ID of the target memory")]
    pub target_id: String,

    #[schemars(
        description = "Only remove this relation kind. When omitted, every kind between the pair is removed."
    )]
    pub kind: Option<String>,
}
