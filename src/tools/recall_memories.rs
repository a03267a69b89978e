use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `recall_memories` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecallMemoriesParams {
    #[schemars(description = "Natural language query to search memories")]
    pub query: String,

    #[schemars(description = "Filter by context/project name")]
    pub context: Option<String>,

    #[schemars(description = "Filter: all listed tags must be present")]
    pub tags: Option<Vec<String>>,

    #[schemars(
        description = "Filter by memory kind: 'insight', 'success', 'failure', 'decision', 'note', or a custom kind"
    )]
    pub kind: Option<String>,

    #[schemars(description = "Maximum number of results to return (1-20). Defaults to 5.")]
    pub max_results: Option<usize>,
}
