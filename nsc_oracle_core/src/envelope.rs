//nsc_oracle_core/envelope.rs

//! Resolution encoder: canonical outcome -> bridge envelope bytes.
//!
//! Inner tuple `(address, bool, bool, uint256, bytes32, uint256, string)`:
//! target, side-A-wins, undetermined, unix timestamp, proof hash, resolved
//! value, winner label. Outer tuple `(address, bytes)`: target, inner bytes.

use serde::{Deserialize, Serialize};

use crate::abi::{decode_tuple, encode_tuple, ParamType, Token};
use crate::equivalence::ConsensusOutcome;
use crate::error::OracleError;
use crate::market::{Address, Market};

pub const RESOLUTION_TYPES: [ParamType; 7] = [
    ParamType::Address,
    ParamType::Bool,
    ParamType::Bool,
    ParamType::Uint256,
    ParamType::FixedBytes32,
    ParamType::Uint256,
    ParamType::String,
];

pub const ENVELOPE_TYPES: [ParamType; 2] = [ParamType::Address, ParamType::Bytes];

/// Reserved for a future proof reference; always zero today.
pub const PLACEHOLDER_HASH: [u8; 32] = [0u8; 32];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionTuple {
    pub target: Address,
    pub side_a_wins: bool,
    pub undetermined: bool,
    pub timestamp: u64,
    pub proof_hash: [u8; 32],
    pub value: u128,
    pub winner: String,
}

impl ResolutionTuple {
    pub fn new(market: &Market, outcome: &ConsensusOutcome, timestamp: u64) -> Result<Self, OracleError> {
        let target = market
            .target
            .ok_or_else(|| OracleError::schema(format!("market `{}` has no target address", market.id)))?;
        let winner = outcome
            .candidate
            .winner
            .clone()
            .ok_or_else(|| OracleError::schema("consensus outcome carries no winner"))?;
        Ok(Self {
            target,
            side_a_wins: winner == market.side_a(),
            undetermined: false,
            timestamp,
            proof_hash: PLACEHOLDER_HASH,
            value: outcome.candidate.resolved_value(),
            winner,
        })
    }

    pub fn tokens(&self) -> Vec<Token> {
        vec![
            Token::Address(self.target),
            Token::Bool(self.side_a_wins),
            Token::Bool(self.undetermined),
            Token::Uint(u128::from(self.timestamp)),
            Token::FixedBytes32(self.proof_hash),
            Token::Uint(self.value),
            Token::String(self.winner.clone()),
        ]
    }

    pub fn encode(&self) -> Result<Vec<u8>, OracleError> {
        encode_tuple(&RESOLUTION_TYPES, &self.tokens())
    }

    pub fn decode(data: &[u8]) -> Result<Self, OracleError> {
        match decode_tuple(&RESOLUTION_TYPES, data)?.as_slice() {
            [Token::Address(target), Token::Bool(side_a_wins), Token::Bool(undetermined), Token::Uint(ts), Token::FixedBytes32(proof_hash), Token::Uint(value), Token::String(winner)] => {
                Ok(Self {
                    target: *target,
                    side_a_wins: *side_a_wins,
                    undetermined: *undetermined,
                    timestamp: u64::try_from(*ts)
                        .map_err(|_| OracleError::schema("timestamp exceeds 64 bits"))?,
                    proof_hash: *proof_hash,
                    value: *value,
                    winner: winner.clone(),
                })
            }
            _ => Err(OracleError::schema("resolution tuple layout")),
        }
    }
}

/// Bytes ready for the bridge transport, plus the pieces they were built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeEnvelope {
    pub target: Address,
    /// Encoded inner resolution tuple.
    pub payload: Vec<u8>,
    /// Encoded outer `(address, bytes)` tuple; this is what gets sent.
    pub bytes: Vec<u8>,
}

impl BridgeEnvelope {
    pub fn decode(bytes: &[u8]) -> Result<(Address, ResolutionTuple), OracleError> {
        match decode_tuple(&ENVELOPE_TYPES, bytes)?.as_slice() {
            [Token::Address(target), Token::Bytes(payload)] => Ok((*target, ResolutionTuple::decode(payload)?)),
            _ => Err(OracleError::schema("envelope tuple layout")),
        }
    }
}

/// Pure: same inputs, same bytes.
pub fn encode(market: &Market, outcome: &ConsensusOutcome, timestamp: u64) -> Result<BridgeEnvelope, OracleError> {
    let tuple = ResolutionTuple::new(market, outcome, timestamp)?;
    let payload = tuple.encode()?;
    let bytes = encode_tuple(
        &ENVELOPE_TYPES,
        &[Token::Address(tuple.target), Token::Bytes(payload.clone())],
    )?;
    tracing::trace!(
        market_id = %market.id,
        payload_len = payload.len(),
        envelope_len = bytes.len(),
        "resolution encoded"
    );
    Ok(BridgeEnvelope { target: tuple.target, payload, bytes })
}

/// Inverse of the inner encoding.
pub fn decode_resolution(payload: &[u8]) -> Result<ResolutionTuple, OracleError> {
    ResolutionTuple::decode(payload)
}

/// Inverse of the outer encoding.
pub fn decode_envelope(bytes: &[u8]) -> Result<(Address, ResolutionTuple), OracleError> {
    BridgeEnvelope::decode(bytes)
}
