use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CuriosityScanParams {
    #[schemars(description = "Restrict the scan to one context/project")]
    pub context: Option<String>,

    #[schemars(description = "Restrict the scan to memories carrying all of these tags")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "Maximum findings per category. Defaults to 10.")]
    pub max_findings: Option<usize>,
}
