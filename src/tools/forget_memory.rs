use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ForgetMemoryParams {
    #[schemars(
        description = "ID of the memory to delete. Every relation and tag edge touching it is removed too."
    )]
    pub memory_id: String,
}
