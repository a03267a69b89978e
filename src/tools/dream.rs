use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DreamParams {
    #[schemars(
        description = "Write worker logs to <data_dir>/logs/dream.log. Defaults to false."
    )]
    pub enable_logging: Option<bool>,
}
