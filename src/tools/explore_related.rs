use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExploreRelatedParams {
    #[schemars(description = "ID of the memory to explore around")]
    pub memory_id: String,

    #[schemars(description = "Include the direct-relation axis. Defaults to true.")]
    pub include_links: Option<bool>,

    #[schemars(description = "Include the shared-tag axis. Defaults to true.")]
    pub include_tag_siblings: Option<bool>,

    #[schemars(description = "Include the same-context axis. Defaults to true.")]
    pub include_context_siblings: Option<bool>,

    #[schemars(description = "Result cap per axis (1-20). Defaults to 5.")]
    pub max_per_axis: Option<usize>,
}
