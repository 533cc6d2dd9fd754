//! Sharded market supervisor.
//!
//! Outside-world facing orchestration around `nsc_oracle_core`:
//! - validates creation requests
//! - drives the equivalence engine over a caller-supplied task
//! - encodes and dispatches the resolution
//! - owns the write-once resolution records and serves them read-only
//!
//! No IO. No async. Records are sharded by `market_id`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nsc_oracle_core::{
    encode, Comparator, EquivalenceEngine, NondetTask, OracleCfg, OracleError, ResolutionRecord,
};

use crate::dispatch::{BridgeCfg, BridgeDispatcher, BridgeTransport};
use crate::variant::{MarketRequest, MarketVariant};

/// A resolved market as held by the supervisor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketEntry {
    pub variant: MarketVariant,
    pub record: ResolutionRecord,
}

/// Read-only view of a resolved market.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionDetails {
    pub market_id: String,
    pub market_title: String,
    pub variant: MarketVariant,
    pub side_a: String,
    pub side_b: String,
    pub resolved_price_cents: u128,
    pub resolved_price: String,
    pub winning_side: String,
    pub announcement_found: Option<bool>,
    pub resolution_url: String,
    pub resolved_at: DateTime<Utc>,
}

impl From<&MarketEntry> for ResolutionDetails {
    fn from(e: &MarketEntry) -> Self {
        let r = &e.record;
        Self {
            market_id: r.market_id.clone(),
            market_title: r.market_title.clone(),
            variant: e.variant.clone(),
            side_a: r.side_a.clone(),
            side_b: r.side_b.clone(),
            resolved_price_cents: r.price_minor,
            resolved_price: r.price_dollars(),
            winning_side: r.winner.clone(),
            announcement_found: r.flag,
            resolution_url: r.resolution_url.clone(),
            resolved_at: r.resolved_at,
        }
    }
}

/// Snapshot of supervisor state for storage-agnostic persistence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SupervisorSnapshot {
    /// Sorted by market id.
    pub markets: Vec<MarketEntry>,
}

impl SupervisorSnapshot {
    pub fn to_json(&self) -> Result<Vec<u8>, OracleError> {
        serde_json::to_vec(self).map_err(|e| OracleError::Snapshot { reason: e.to_string() })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, OracleError> {
        serde_json::from_slice(bytes).map_err(|e| OracleError::Snapshot { reason: e.to_string() })
    }
}

/// Counters returned by `restore`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStats {
    /// Records inserted from the snapshot.
    pub applied: usize,
    /// Ids already resolved here; the existing record is kept.
    pub skipped: usize,
    /// Entries that fail record validation.
    pub rejected: usize,
}

#[derive(Default, Debug)]
struct Shard {
    markets: HashMap<String, MarketEntry>,
}

/// Deterministic FNV-1a hash (stable across runs).
fn fnv1a_u64(s: &str) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn shard_index(market_id: &str, shard_count: usize) -> usize {
    if shard_count <= 1 {
        return 0;
    }
    (fnv1a_u64(market_id) as usize) % shard_count
}

#[derive(Debug)]
pub struct MarketSupervisor<T> {
    engine: EquivalenceEngine,
    /// Default route; requests may override it.
    bridge: Option<BridgeCfg>,
    dispatcher: BridgeDispatcher<T>,
    shards: usize,
    state_shards: Vec<Mutex<Shard>>,
}

impl<T: BridgeTransport> MarketSupervisor<T> {
    /// `shards=1` is the default. Fails if `cfg` does not validate.
    pub fn new(shards: usize, cfg: OracleCfg, transport: T) -> Result<Self, OracleError> {
        cfg.validate()?;
        let shards = shards.max(1);
        let state_shards = (0..shards).map(|_| Mutex::new(Shard::default())).collect();
        Ok(Self {
            engine: EquivalenceEngine::new(cfg),
            bridge: None,
            dispatcher: BridgeDispatcher::new(transport),
            shards,
            state_shards,
        })
    }

    pub fn with_bridge(mut self, bridge: BridgeCfg) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_comparator<C>(mut self, comparator: C) -> Self
    where
        C: Comparator + Send + Sync + 'static,
    {
        self.engine = self.engine.with_comparator(comparator);
        self
    }

    pub fn cfg(&self) -> &OracleCfg {
        self.engine.cfg()
    }

    pub fn transport(&self) -> &T {
        self.dispatcher.transport()
    }

    fn shard(&self, market_id: &str) -> MutexGuard<'_, Shard> {
        self.state_shards[shard_index(market_id, self.shards)]
            .lock()
            .expect("market supervisor shard mutex poisoned")
    }

    /// Resolve and record a market, stamped with the current time.
    pub fn create_market(
        &self,
        req: &MarketRequest<'_>,
        task: &dyn NondetTask,
    ) -> Result<ResolutionRecord, OracleError> {
        self.create_market_at(req, task, Utc::now())
    }

    /// Validate, resolve, encode, record, dispatch. Any error leaves no trace:
    /// the record is written only once everything before it has succeeded.
    pub fn create_market_at(
        &self,
        req: &MarketRequest<'_>,
        task: &dyn NondetTask,
        now: DateTime<Utc>,
    ) -> Result<ResolutionRecord, OracleError> {
        // 1) Validate before anything runs.
        let market = req.to_market()?;
        let bridge = req.bridge.clone().or_else(|| self.bridge.clone());
        if let Some(b) = &bridge {
            b.validate()?;
            if market.target.is_none() {
                return Err(OracleError::validation(format!(
                    "bridged market `{}` needs an address target",
                    market.id
                )));
            }
        }
        if self.contains(&market.id) {
            return Err(OracleError::validation(format!("market `{}` is already resolved", market.id)));
        }

        // 2) Consensus over independent executions.
        let params = req.variant.task_params(&market);
        let policy = req.variant.policy(&market.labels);
        let outcome = self.engine.resolve(task, &params, &policy)?;

        // 3) Build everything that will become visible.
        let record = ResolutionRecord::new(&market, &outcome, params.url, now)?;
        let envelope = match &bridge {
            Some(_) => Some(encode(&market, &outcome, record.timestamp()?)?),
            None => None,
        };

        // 4) Write once.
        {
            let mut guard = self.shard(&market.id);
            if guard.markets.contains_key(&market.id) {
                return Err(OracleError::validation(format!("market `{}` is already resolved", market.id)));
            }
            guard.markets.insert(
                market.id.clone(),
                MarketEntry { variant: req.variant.clone(), record: record.clone() },
            );
        }
        tracing::info!(
            market_id = %record.market_id,
            winner = %record.winner,
            price_minor = %record.price_minor,
            "market resolved"
        );

        // 5) Fire and forget.
        if let (Some(env), Some(b)) = (envelope, bridge) {
            self.dispatcher.dispatch(&env, &b);
        }
        Ok(record)
    }

    pub fn contains(&self, market_id: &str) -> bool {
        self.shard(market_id).markets.contains_key(market_id)
    }

    pub fn get(&self, market_id: &str) -> Option<ResolutionRecord> {
        self.shard(market_id).markets.get(market_id).map(|e| e.record.clone())
    }

    pub fn details(&self, market_id: &str) -> Option<ResolutionDetails> {
        self.shard(market_id).markets.get(market_id).map(ResolutionDetails::from)
    }

    pub fn len(&self) -> usize {
        self.state_shards
            .iter()
            .map(|s| s.lock().expect("market supervisor shard mutex poisoned").markets.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted.
    pub fn market_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for shard in &self.state_shards {
            let guard = shard.lock().expect("market supervisor shard mutex poisoned");
            ids.extend(guard.markets.keys().cloned());
        }
        ids.sort();
        ids
    }

    /// Export all resolved markets. Deterministic ordering by market id.
    pub fn snapshot(&self) -> SupervisorSnapshot {
        self.snapshot_filtered(|_, _| true)
    }

    /// Export only the markets accepted by `predicate`.
    pub fn snapshot_filtered<F>(&self, mut predicate: F) -> SupervisorSnapshot
    where
        F: FnMut(&str, &MarketEntry) -> bool,
    {
        let mut out: Vec<MarketEntry> = Vec::new();

        // Lock shards in a stable order.
        for shard in &self.state_shards {
            let guard = shard.lock().expect("market supervisor shard mutex poisoned");
            for (k, v) in guard.markets.iter() {
                if predicate(k.as_str(), v) {
                    out.push(v.clone());
                }
            }
        }

        out.sort_by(|a, b| a.record.market_id.cmp(&b.record.market_id));
        SupervisorSnapshot { markets: out }
    }

    pub fn snapshot_markets(&self, market_ids: &[&str]) -> SupervisorSnapshot {
        let want: HashSet<&str> = market_ids.iter().copied().collect();
        self.snapshot_filtered(|id, _| want.contains(id))
    }

    /// Load records from a snapshot. Resolved records are never replaced:
    /// ids already present are skipped, invalid entries are rejected.
    pub fn restore(&self, snap: SupervisorSnapshot) -> RestoreStats {
        let mut stats = RestoreStats::default();
        for entry in snap.markets {
            if let Err(e) = entry.record.validate().and_then(|()| entry.variant.validate()) {
                tracing::warn!(market_id = %entry.record.market_id, error = %e, "snapshot entry rejected");
                stats.rejected += 1;
                continue;
            }
            let id = entry.record.market_id.clone();
            let mut guard = self.shard(&id);
            if guard.markets.contains_key(&id) {
                stats.skipped += 1;
                continue;
            }
            guard.markets.insert(id, entry);
            stats.applied += 1;
        }
        tracing::debug!(
            applied = stats.applied,
            skipped = stats.skipped,
            rejected = stats.rejected,
            "snapshot restored"
        );
        stats
    }
}
