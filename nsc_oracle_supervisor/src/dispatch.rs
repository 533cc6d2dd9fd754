//! Bridge dispatch: hand an encoded envelope to the outbound cross-chain channel.
//!
//! Fire-and-forget. Delivery, acknowledgement and retry belong to the transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use nsc_oracle_core::{BridgeEnvelope, OracleError};

pub const ENV_DEST_CHAIN_ID: &str = "NSC_ORACLE_DEST_CHAIN_ID";
pub const ENV_DEST_CONTRACT: &str = "NSC_ORACLE_DEST_CONTRACT";

/// Where resolutions are delivered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeCfg {
    /// Messaging-layer id of the destination chain.
    pub destination_chain_id: u32,
    /// Contract on the destination chain that receives the envelope.
    pub destination_contract: String,
}

impl BridgeCfg {
    pub fn new(destination_chain_id: u32, destination_contract: impl Into<String>) -> Self {
        Self { destination_chain_id, destination_contract: destination_contract.into() }
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        if self.destination_contract.trim().is_empty() {
            return Err(OracleError::validation("bridge destination contract is required"));
        }
        Ok(())
    }

    /// `None` when the destination contract is not configured.
    pub fn from_env() -> Result<Option<Self>, OracleError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, OracleError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(contract) = lookup(ENV_DEST_CONTRACT) else {
            return Ok(None);
        };
        let chain = lookup(ENV_DEST_CHAIN_ID)
            .ok_or_else(|| OracleError::validation(format!("{ENV_DEST_CHAIN_ID} is required with {ENV_DEST_CONTRACT}")))?;
        let chain = chain
            .trim()
            .parse()
            .map_err(|_| OracleError::validation(format!("{ENV_DEST_CHAIN_ID}=`{chain}` is not a chain id")))?;
        let cfg = BridgeCfg::new(chain, contract.trim());
        cfg.validate()?;
        Ok(Some(cfg))
    }
}

/// Outbound cross-chain messaging channel.
pub trait BridgeTransport {
    fn send_message(&self, destination_chain_id: u32, destination_contract: &str, payload: &[u8]);
}

impl<T: BridgeTransport + ?Sized> BridgeTransport for Arc<T> {
    fn send_message(&self, destination_chain_id: u32, destination_contract: &str, payload: &[u8]) {
        (**self).send_message(destination_chain_id, destination_contract, payload)
    }
}

/// One message as handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub destination_chain_id: u32,
    pub destination_contract: String,
    pub payload: Vec<u8>,
}

/// Queues messages in memory for a relayer to pick up.
#[derive(Debug, Default)]
pub struct OutboxTransport {
    queue: Mutex<VecDeque<OutboundMessage>>,
}

impl OutboxTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("outbox mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest message first.
    pub fn pop(&self) -> Option<OutboundMessage> {
        self.queue.lock().expect("outbox mutex poisoned").pop_front()
    }

    pub fn drain(&self) -> Vec<OutboundMessage> {
        self.queue.lock().expect("outbox mutex poisoned").drain(..).collect()
    }
}

impl BridgeTransport for OutboxTransport {
    fn send_message(&self, destination_chain_id: u32, destination_contract: &str, payload: &[u8]) {
        self.queue
            .lock()
            .expect("outbox mutex poisoned")
            .push_back(OutboundMessage {
                destination_chain_id,
                destination_contract: destination_contract.to_string(),
                payload: payload.to_vec(),
            });
    }
}

/// Drops messages after logging them. For deployments without a bridge.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTransport;

impl BridgeTransport for LogTransport {
    fn send_message(&self, destination_chain_id: u32, destination_contract: &str, payload: &[u8]) {
        tracing::info!(
            destination_chain_id,
            destination_contract,
            payload_len = payload.len(),
            "bridge message not relayed (log transport)"
        );
    }
}

#[derive(Debug)]
pub struct BridgeDispatcher<T> {
    transport: T,
}

impl<T: BridgeTransport> BridgeDispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Single shot; nothing is returned and nothing is retried.
    pub fn dispatch(&self, envelope: &BridgeEnvelope, bridge: &BridgeCfg) {
        tracing::info!(
            destination_chain_id = bridge.destination_chain_id,
            destination_contract = %bridge.destination_contract,
            target = %envelope.target,
            envelope_len = envelope.bytes.len(),
            "dispatching resolution"
        );
        self.transport
            .send_message(bridge.destination_chain_id, &bridge.destination_contract, &envelope.bytes);
    }
}
