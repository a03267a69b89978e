use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ConsolidatePatternsParams {
    #[schemars(description = "Only mine clusters sharing this tag")]
    pub tag: Option<String>,

    #[schemars(description = "Minimum memories to form a pattern. Defaults to 3.")]
    pub min_cluster_size: Option<usize>,
}
