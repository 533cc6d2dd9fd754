use serde::{Deserialize, Serialize};

use crate::equivalence::StrictLayer;
use crate::error::OracleError;

pub const ENV_EXECUTORS: &str = "NSC_ORACLE_EXECUTORS";
pub const ENV_STRICT_LAYER: &str = "NSC_ORACLE_STRICT_LAYER";
pub const ENV_PRICE_TOLERANCE_BPS: &str = "NSC_ORACLE_PRICE_TOLERANCE_BPS";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleCfg {
    /// Independent executions per resolution.
    pub executor_count: usize,
    /// What strict mode compares.
    pub strict_layer: StrictLayer,
    /// Comparative mode only: allowed relative price spread against the
    /// leader, in basis points. `None` leaves prices out of the comparison.
    pub price_tolerance_bps: Option<u32>,
}

impl Default for OracleCfg {
    fn default() -> Self {
        Self {
            executor_count: 3,
            strict_layer: StrictLayer::Parsed,
            price_tolerance_bps: None,
        }
    }
}

impl OracleCfg {
    /// Defaults overridden by `NSC_ORACLE_*` environment variables.
    pub fn from_env() -> Result<Self, OracleError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, OracleError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_EXECUTORS) {
            cfg.executor_count = v
                .trim()
                .parse()
                .map_err(|_| OracleError::validation(format!("{ENV_EXECUTORS}=`{v}` is not a count")))?;
        }
        if let Some(v) = lookup(ENV_STRICT_LAYER) {
            cfg.strict_layer = match v.trim().to_ascii_lowercase().as_str() {
                "parsed" => StrictLayer::Parsed,
                "raw" => StrictLayer::Raw,
                _ => {
                    return Err(OracleError::validation(format!(
                        "{ENV_STRICT_LAYER}=`{v}` must be `parsed` or `raw`"
                    )))
                }
            };
        }
        if let Some(v) = lookup(ENV_PRICE_TOLERANCE_BPS) {
            cfg.price_tolerance_bps = Some(v.trim().parse().map_err(|_| {
                OracleError::validation(format!("{ENV_PRICE_TOLERANCE_BPS}=`{v}` is not a number"))
            })?);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        if self.executor_count == 0 {
            return Err(OracleError::validation("executor_count must be at least 1"));
        }
        Ok(())
    }
}
