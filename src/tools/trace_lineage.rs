use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TraceLineageParams {
    #[schemars(description = "Starting memory ID")]
    pub memory_id: String,

    #[schemars(
        description = "'backward' to find ancestors (what this descended from), 'forward' to find descendants. Defaults to 'backward'."
    )]
    pub direction: Option<String>,

    #[schemars(
        description = "Relation kinds to follow. Defaults to ['evolved_from', 'caused_by', 'rejected_because', 'supersedes']."
    )]
    pub kinds: Option<Vec<String>>,

    #[schemars(description = "Maximum traversal depth. Defaults to 10.")]
    pub max_depth: Option<usize>,
}
