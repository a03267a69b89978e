use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct LinkMemoriesParams {
    #[schemars(description = "ID of the source memory")]
    pub source_id: String,

    #[schemars(description = "ID of the target memory")]
    pub target_id: String,

    #[schemars(
        description = "Relation kind: 'related', 'supersedes', 'contradicts', 'extends', 'depends_on', 'evolved_from', 'rejected_because', 'caused_by', or a custom kind. Defaults to 'related'."
    )]
    pub kind: Option<String>,

    #[schemars(description = "Free-text reason for the link")]
    pub reason: Option<String>,
}
