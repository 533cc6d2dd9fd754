use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OracleError;

/// 20-byte account address on the destination chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != 40 {
            return Err(OracleError::validation(format!(
                "address `{s}` must be 20 bytes of hex"
            )));
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|e| OracleError::validation(format!("address `{s}`: {e}")))?;
        Ok(Address(out))
    }
}

impl TryFrom<String> for Address {
    type Error = OracleError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> String {
        a.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// The two mutually exclusive outcome labels of a market.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    pub side_a: String,
    pub side_b: String,
}

impl LabelSet {
    pub fn new(side_a: impl Into<String>, side_b: impl Into<String>) -> Result<Self, OracleError> {
        let side_a = side_a.into();
        let side_b = side_b.into();
        if side_a.is_empty() || side_b.is_empty() {
            return Err(OracleError::validation("both side labels are required"));
        }
        if side_a == side_b {
            return Err(OracleError::validation(format!(
                "side labels must differ (both are `{side_a}`)"
            )));
        }
        Ok(Self { side_a, side_b })
    }

    /// Exact membership: no trimming, no case folding.
    #[inline]
    pub fn contains(&self, label: &str) -> bool {
        label == self.side_a || label == self.side_b
    }
}

/// The question being resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub title: String,
    pub labels: LabelSet,
    /// Entity the resolution is addressed to on the destination chain.
    /// Derived from `id` when the id itself is an address.
    pub target: Option<Address>,
}

impl Market {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        side_a: impl Into<String>,
        side_b: impl Into<String>,
    ) -> Result<Self, OracleError> {
        let id = id.into();
        let title = title.into();
        if id.is_empty() {
            return Err(OracleError::validation("market id is required"));
        }
        if title.is_empty() {
            return Err(OracleError::validation("market title is required"));
        }
        let labels = LabelSet::new(side_a, side_b)?;
        let target = id.parse::<Address>().ok();
        Ok(Self { id, title, labels, target })
    }

    pub fn with_target(mut self, target: Address) -> Self {
        self.target = Some(target);
        self
    }

    pub fn side_a(&self) -> &str {
        &self.labels.side_a
    }

    pub fn side_b(&self) -> &str {
        &self.labels.side_b
    }
}
