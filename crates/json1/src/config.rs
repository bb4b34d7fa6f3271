use serde::Deserialize;

use crate::error::{Error, Result};

/// Tuning knobs for [`Json1Type`](crate::Json1Type).
///
/// ```toml
/// max_conflict_rounds = 16
/// check_output = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Json1Config {
    /// How many conflicts `transform_with_conflicts_pred` resolves before
    /// giving up.
    pub max_conflict_rounds: usize,
    /// Run `check_valid_op` on every operation the type produces.
    pub check_output: bool,
}

impl Default for Json1Config {
    fn default() -> Self {
        Self { max_conflict_rounds: 64, check_output: false }
    }
}

impl Json1Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }
}
