use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::ParseStage;
use crate::equivalence::ConsensusOutcome;
use crate::error::OracleError;
use crate::market::{LabelSet, Market};

/// Write-once resolution of a market.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    pub market_id: String,
    pub market_title: String,
    pub side_a: String,
    pub side_b: String,
    /// Cents for price markets, 0/1 for flag markets.
    pub price_minor: u128,
    pub winner: String,
    pub flag: Option<bool>,
    pub side_a_wins: bool,
    pub resolution_url: String,
    pub resolved_at: DateTime<Utc>,
    pub leader_stage: ParseStage,
}

impl ResolutionRecord {
    pub fn new(
        market: &Market,
        outcome: &ConsensusOutcome,
        resolution_url: impl Into<String>,
        resolved_at: DateTime<Utc>,
    ) -> Result<Self, OracleError> {
        let winner = outcome
            .candidate
            .winner
            .clone()
            .filter(|w| market.labels.contains(w))
            .ok_or_else(|| OracleError::schema("consensus winner outside the market's labels"))?;
        Ok(Self {
            market_id: market.id.clone(),
            market_title: market.title.clone(),
            side_a: market.side_a().to_owned(),
            side_b: market.side_b().to_owned(),
            price_minor: outcome.candidate.resolved_value(),
            side_a_wins: winner == market.side_a(),
            winner,
            flag: outcome.candidate.flag,
            resolution_url: resolution_url.into(),
            resolved_at,
            leader_stage: outcome.leader_stage,
        })
    }

    /// Invariants every stored record holds, whatever its origin.
    pub fn validate(&self) -> Result<(), OracleError> {
        if self.market_id.is_empty() {
            return Err(OracleError::validation("record without a market id"));
        }
        let labels = LabelSet::new(self.side_a.as_str(), self.side_b.as_str())?;
        if !labels.contains(&self.winner) {
            return Err(OracleError::validation(format!(
                "market `{}`: winner `{}` is not one of its labels",
                self.market_id, self.winner
            )));
        }
        if self.side_a_wins != (self.winner == self.side_a) {
            return Err(OracleError::validation(format!(
                "market `{}`: side_a_wins contradicts the winner",
                self.market_id
            )));
        }
        if let Some(flag) = self.flag {
            if self.price_minor != u128::from(flag) {
                return Err(OracleError::validation(format!(
                    "market `{}`: flag market value must be 0 or 1",
                    self.market_id
                )));
            }
        }
        Ok(())
    }

    /// Unix seconds, as carried in the envelope.
    pub fn timestamp(&self) -> Result<u64, OracleError> {
        u64::try_from(self.resolved_at.timestamp())
            .map_err(|_| OracleError::schema("resolution time precedes the unix epoch"))
    }

    /// `$65000.50`
    pub fn price_dollars(&self) -> String {
        format!("${}.{:02}", self.price_minor / 100, self.price_minor % 100)
    }
}
