#![allow(clippy::missing_safety_doc)]

use std::ptr;

use chrono::{DateTime, Utc};

use nsc_oracle_core::{
    encode, Address, ConsensusOutcome, LabelSet, Market, OracleCfg, OracleError, OutcomeSchema, ParseStage, ParsedCandidate,
    ReplayTask, ResultParser, StrictLayer,
};
use nsc_oracle_supervisor::{
    BridgeCfg, MarketRequest, MarketSupervisor, MarketVariant, OutboxTransport, SupervisorSnapshot,
};

/// FFI ABI version for nsc_oracle_ffi.
///
/// Bump this when any `#[repr(C)]` struct layout or exported function signature changes.
pub const NSC_ORACLE_FFI_VERSION: u32 = 2;

#[no_mangle]
pub extern "C" fn nsc_oracle_ffi_version() -> u32 {
    NSC_ORACLE_FFI_VERSION
}

// Snapshot wire format identification.
const SNAP_MAGIC: u32 = 0x3143_524F; // "ORC1" little-endian
const SNAP_VERSION: u32 = 1;
const SNAP_HEADER_LEN: usize = 12;

// Return codes.
pub const NSC_OK: i32 = 0;
pub const NSC_ERR_NULL: i32 = -1;
pub const NSC_ERR_UTF8: i32 = -2;
pub const NSC_ERR_FRAME: i32 = -3;
pub const NSC_ERR_MAGIC: i32 = -8;
pub const NSC_ERR_VERSION: i32 = -9;
pub const NSC_ERR_VALIDATION: i32 = -10;
pub const NSC_ERR_DISAGREEMENT: i32 = -11;
pub const NSC_ERR_SCHEMA: i32 = -12;
pub const NSC_ERR_TASK: i32 = -13;
pub const NSC_ERR_SNAPSHOT: i32 = -14;

fn error_code(e: &OracleError) -> i32 {
    match e {
        OracleError::Validation { .. } => NSC_ERR_VALIDATION,
        OracleError::Disagreement { .. } => NSC_ERR_DISAGREEMENT,
        OracleError::Schema { .. } => NSC_ERR_SCHEMA,
        OracleError::Task { .. } => NSC_ERR_TASK,
        OracleError::Snapshot { .. } => NSC_ERR_SNAPSHOT,
    }
}

/// Opaque handle exposed over FFI.
/// Dispatched envelopes queue in the outbox until taken with `nsc_oracle_take_envelope`.
#[repr(C)]
pub struct NscOracleSupervisor {
    inner: MarketSupervisor<OutboxTransport>,
}

/// FFI string view (UTF-8 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NscStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl NscStr {
    fn as_str(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        std::str::from_utf8(bytes).ok()
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        if self.ptr.is_null() {
            return None;
        }
        Some(unsafe { std::slice::from_raw_parts(self.ptr, self.len) })
    }
}

/// Owned byte buffer (envelopes, snapshots).
#[repr(C)]
pub struct NscBytes {
    pub ptr: *mut u8,
    pub len: usize,
}

impl NscBytes {
    fn empty() -> Self {
        NscBytes { ptr: ptr::null_mut(), len: 0 }
    }

    fn from_vec(buf: Vec<u8>) -> Self {
        let mut boxed = buf.into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        let len = boxed.len();
        std::mem::forget(boxed);
        NscBytes { ptr, len }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NscOutcomeSchema {
    PriceAndWinner = 0,
    FlagAndWinner = 1,
}

impl From<NscOutcomeSchema> for OutcomeSchema {
    fn from(s: NscOutcomeSchema) -> Self {
        match s {
            NscOutcomeSchema::PriceAndWinner => OutcomeSchema::PriceAndWinner,
            NscOutcomeSchema::FlagAndWinner => OutcomeSchema::FlagAndWinner,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NscVariantKind {
    Crypto = 0,
    Stock = 1,
    News = 2,
}

/// Market creation request.
/// `symbol`/`name` are used by Crypto and Stock, `region` by News.
/// A null `target` means "derive from `market_id`".
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NscMarket {
    pub market_id: NscStr,
    pub market_title: NscStr,
    pub side_a: NscStr,
    pub side_b: NscStr,
    pub target: NscStr,
    pub kind: NscVariantKind,
    pub symbol: NscStr,
    pub name: NscStr,
    pub region: NscStr,
}

/// Parsed (or resolved) outcome.
/// `flag` is -1 when the schema carries none; `price_cents` holds the resolved value.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct NscCandidate {
    pub rc: i32,
    /// 0 direct, 1 extracted, 2 repaired, 3 field scan, 4 default
    pub stage: u8,
    pub has_price: u8,
    pub price_cents: u64,
    pub flag: i8,
    pub side_a_wins: u8,
}

impl NscCandidate {
    fn failed(rc: i32) -> Self {
        NscCandidate { rc, stage: 0, has_price: 0, price_cents: 0, flag: -1, side_a_wins: 0 }
    }

    fn from_parts(c: &ParsedCandidate, stage: ParseStage, side_a: &str) -> Self {
        NscCandidate {
            rc: NSC_OK,
            stage: stage_to_ffi(stage),
            has_price: c.price.is_some() as u8,
            price_cents: u64::try_from(c.resolved_value()).unwrap_or(u64::MAX),
            flag: c.flag.map(|f| f as i8).unwrap_or(-1),
            side_a_wins: (c.winner.as_deref() == Some(side_a)) as u8,
        }
    }
}

fn stage_to_ffi(s: ParseStage) -> u8 {
    match s {
        ParseStage::Direct => 0,
        ParseStage::Extracted => 1,
        ParseStage::Repaired => 2,
        ParseStage::FieldScan => 3,
        ParseStage::Default => 4,
    }
}

/// Restore result statistics (FFI-safe).
#[repr(C)]
pub struct NscRestoreStats {
    pub applied: u32,
    pub skipped: u32,
    pub rejected: u32,
    pub rc: i32,
}

impl NscRestoreStats {
    fn failed(rc: i32) -> Self {
        NscRestoreStats { applied: 0, skipped: 0, rejected: 0, rc }
    }
}

/// Supervisor cfg for FFI (keep it minimal).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NscCfg {
    pub executor_count: u32,
    pub strict_raw: u8,
    pub price_tolerance_bps: i32, // -1 means None
}

#[no_mangle]
pub extern "C" fn nsc_oracle_cfg_default() -> NscCfg {
    let d = OracleCfg::default();
    NscCfg {
        executor_count: d.executor_count as u32,
        strict_raw: (d.strict_layer == StrictLayer::Raw) as u8,
        price_tolerance_bps: d.price_tolerance_bps.map(|v| v as i32).unwrap_or(-1),
    }
}

fn cfg_from_ffi(c: NscCfg) -> OracleCfg {
    OracleCfg {
        executor_count: c.executor_count as usize,
        strict_layer: if c.strict_raw != 0 { StrictLayer::Raw } else { StrictLayer::Parsed },
        price_tolerance_bps: if c.price_tolerance_bps < 0 { None } else { Some(c.price_tolerance_bps as u32) },
    }
}

/// Bridge route for FFI. A null `destination_contract` disables bridging.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NscBridge {
    pub destination_chain_id: u32,
    pub destination_contract: NscStr,
}

fn text(s: &NscStr) -> Result<&str, i32> {
    s.as_str().ok_or(NSC_ERR_UTF8)
}

fn optional(s: &NscStr) -> Result<Option<&str>, i32> {
    if s.ptr.is_null() {
        Ok(None)
    } else {
        text(s).map(Some)
    }
}

fn request_from_ffi(m: &NscMarket) -> Result<MarketRequest<'_>, i32> {
    let variant = match m.kind {
        NscVariantKind::Crypto => MarketVariant::crypto(text(&m.symbol)?, text(&m.name)?),
        NscVariantKind::Stock => MarketVariant::stock(text(&m.symbol)?, text(&m.name)?),
        NscVariantKind::News => MarketVariant::news(text(&m.region)?).map_err(|e| error_code(&e))?,
    };
    let mut req = MarketRequest::new(
        text(&m.market_id)?,
        text(&m.market_title)?,
        text(&m.side_a)?,
        text(&m.side_b)?,
        variant,
    );
    if let Some(t) = optional(&m.target)? {
        let target: Address = t.parse().map_err(|e| error_code(&e))?;
        req = req.with_target(target);
    }
    Ok(req)
}

/// Parse one executor output against a label pair.
#[no_mangle]
pub extern "C" fn nsc_oracle_parse(
    side_a: NscStr,
    side_b: NscStr,
    schema: NscOutcomeSchema,
    output: NscStr,
) -> NscCandidate {
    let (Some(a), Some(b)) = (side_a.as_str(), side_b.as_str()) else {
        return NscCandidate::failed(NSC_ERR_UTF8);
    };
    let labels = match LabelSet::new(a, b) {
        Ok(l) => l,
        Err(e) => return NscCandidate::failed(error_code(&e)),
    };
    let Some(raw) = output.as_bytes() else {
        return NscCandidate::failed(NSC_ERR_NULL);
    };
    let parsed = ResultParser::new(labels, schema.into()).parse_bytes(raw);
    NscCandidate::from_parts(&parsed.candidate, parsed.stage, a)
}

/// Encode the envelope for a single executor output, as if it were the consensus.
/// Returns an empty buffer on any failure.
#[no_mangle]
pub unsafe extern "C" fn nsc_oracle_encode(
    market: *const NscMarket,
    output: NscStr,
    timestamp: u64,
) -> NscBytes {
    if market.is_null() {
        return NscBytes::empty();
    }
    let Ok(req) = request_from_ffi(&*market) else {
        return NscBytes::empty();
    };
    let Ok(m) = req.to_market() else {
        return NscBytes::empty();
    };
    let Some(raw) = output.as_bytes() else {
        return NscBytes::empty();
    };
    let parsed = ResultParser::new(m.labels.clone(), req.variant.schema()).parse_bytes(raw);
    let outcome = ConsensusOutcome { candidate: parsed.candidate, leader_stage: parsed.stage, executors: 1 };
    encode_for(&m, &outcome, timestamp)
}

fn encode_for(market: &Market, outcome: &ConsensusOutcome, timestamp: u64) -> NscBytes {
    match encode(market, outcome, timestamp) {
        Ok(env) => NscBytes::from_vec(env.bytes),
        Err(e) => {
            tracing::warn!(market_id = %market.id, error = %e, "ffi encode failed");
            NscBytes::empty()
        }
    }
}

/// Create a new supervisor handle.
///
/// Notes:
/// - `shards` controls internal state sharding (market_id -> shard).
/// - This library does not spawn threads. If you call into the same handle concurrently from
///   multiple threads, calls will serialize per-shard via internal mutexes.
/// - Returns null when `cfg` is invalid or the bridge route is present but invalid.
#[no_mangle]
pub extern "C" fn nsc_oracle_supervisor_new(shards: usize, cfg: NscCfg, bridge: NscBridge) -> *mut NscOracleSupervisor {
    let mut sup = match MarketSupervisor::new(shards.max(1), cfg_from_ffi(cfg), OutboxTransport::new()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "ffi supervisor cfg rejected");
            return ptr::null_mut();
        }
    };
    if !bridge.destination_contract.ptr.is_null() {
        let Some(contract) = bridge.destination_contract.as_str() else {
            return ptr::null_mut();
        };
        let route = BridgeCfg::new(bridge.destination_chain_id, contract);
        if route.validate().is_err() {
            return ptr::null_mut();
        }
        sup = sup.with_bridge(route);
    }
    Box::into_raw(Box::new(NscOracleSupervisor { inner: sup }))
}

#[no_mangle]
pub unsafe extern "C" fn nsc_oracle_supervisor_free(h: *mut NscOracleSupervisor) {
    if !h.is_null() {
        drop(Box::from_raw(h));
    }
}

/// Resolve a market from executor outputs collected by the host, one per executor
/// (index 0 is the leader). `resolved_at` is unix seconds; negative means now.
#[no_mangle]
pub unsafe extern "C" fn nsc_oracle_resolve_outputs(
    h: *mut NscOracleSupervisor,
    market: *const NscMarket,
    outputs_ptr: *const NscStr,
    outputs_len: usize,
    resolved_at: i64,
) -> NscCandidate {
    if h.is_null() || market.is_null() || outputs_ptr.is_null() {
        return NscCandidate::failed(NSC_ERR_NULL);
    }
    let handle = &*h;
    let req = match request_from_ffi(&*market) {
        Ok(r) => r,
        Err(rc) => return NscCandidate::failed(rc),
    };

    let outputs = std::slice::from_raw_parts(outputs_ptr, outputs_len);
    let mut texts: Vec<String> = Vec::with_capacity(outputs_len);
    for o in outputs {
        match o.as_bytes() {
            Some(b) => texts.push(String::from_utf8_lossy(b).into_owned()),
            None => return NscCandidate::failed(NSC_ERR_NULL),
        }
    }
    let task = ReplayTask::new(texts);

    let now = if resolved_at < 0 {
        Utc::now()
    } else {
        match DateTime::from_timestamp(resolved_at, 0) {
            Some(t) => t,
            None => return NscCandidate::failed(NSC_ERR_VALIDATION),
        }
    };

    match handle.inner.create_market_at(&req, &task, now) {
        Ok(record) => NscCandidate {
            rc: NSC_OK,
            stage: stage_to_ffi(record.leader_stage),
            has_price: record.flag.is_none() as u8,
            price_cents: u64::try_from(record.price_minor).unwrap_or(u64::MAX),
            flag: record.flag.map(|f| f as i8).unwrap_or(-1),
            side_a_wins: record.side_a_wins as u8,
        },
        Err(e) => {
            tracing::warn!(market_id = %req.market_id, error = %e, "ffi resolve rejected");
            NscCandidate::failed(error_code(&e))
        }
    }
}

/// Pop the oldest dispatched envelope; empty buffer when none is queued.
/// Must be freed with `nsc_oracle_bytes_free`.
#[no_mangle]
pub unsafe extern "C" fn nsc_oracle_take_envelope(h: *mut NscOracleSupervisor) -> NscBytes {
    if h.is_null() {
        return NscBytes::empty();
    }
    let handle = &*h;
    match handle.inner.transport().pop() {
        Some(msg) => NscBytes::from_vec(msg.payload),
        None => NscBytes::empty(),
    }
}

/// Snapshot format (binary):
/// [u32 magic = "ORC1"][u32 version = 1][u32 body_len][body_len bytes of JSON]
#[no_mangle]
pub unsafe extern "C" fn nsc_oracle_snapshot(h: *mut NscOracleSupervisor) -> NscBytes {
    if h.is_null() {
        return NscBytes::empty();
    }
    let handle = &*h;
    let body = match handle.inner.snapshot().to_json() {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "ffi snapshot failed");
            return NscBytes::empty();
        }
    };
    let Ok(body_len) = u32::try_from(body.len()) else {
        return NscBytes::empty();
    };

    let mut buf: Vec<u8> = Vec::with_capacity(SNAP_HEADER_LEN + body.len());
    buf.extend_from_slice(&SNAP_MAGIC.to_le_bytes());
    buf.extend_from_slice(&SNAP_VERSION.to_le_bytes());
    buf.extend_from_slice(&body_len.to_le_bytes());
    buf.extend_from_slice(&body);

    NscBytes::from_vec(buf)
}

#[no_mangle]
pub unsafe extern "C" fn nsc_oracle_bytes_free(b: NscBytes) {
    if !b.ptr.is_null() {
        let slice_ptr = std::ptr::slice_from_raw_parts_mut(b.ptr, b.len);
        drop(Box::from_raw(slice_ptr));
    }
}

fn read_snapshot(data: &[u8]) -> Result<SupervisorSnapshot, i32> {
    let read_u32 = |at: usize| -> Option<u32> {
        let word = data.get(at..at + 4)?;
        Some(u32::from_le_bytes(word.try_into().ok()?))
    };

    let magic = read_u32(0).ok_or(NSC_ERR_FRAME)?;
    if magic != SNAP_MAGIC {
        return Err(NSC_ERR_MAGIC);
    }
    let ver = read_u32(4).ok_or(NSC_ERR_FRAME)?;
    if ver != SNAP_VERSION {
        return Err(NSC_ERR_VERSION);
    }
    let body_len = read_u32(8).ok_or(NSC_ERR_FRAME)? as usize;
    let body = data
        .get(SNAP_HEADER_LEN..SNAP_HEADER_LEN + body_len)
        .ok_or(NSC_ERR_FRAME)?;
    SupervisorSnapshot::from_json(body).map_err(|e| error_code(&e))
}

/// Restore from a buffer produced by `nsc_oracle_snapshot`.
/// Ids already resolved on this handle are skipped; invalid entries are rejected.
#[no_mangle]
pub unsafe extern "C" fn nsc_oracle_restore(
    h: *mut NscOracleSupervisor,
    bytes: *const u8,
    len: usize,
) -> NscRestoreStats {
    if h.is_null() || bytes.is_null() || len < SNAP_HEADER_LEN {
        return NscRestoreStats::failed(NSC_ERR_NULL);
    }
    let handle = &*h;
    let data = std::slice::from_raw_parts(bytes, len);

    let snap = match read_snapshot(data) {
        Ok(s) => s,
        Err(rc) => return NscRestoreStats::failed(rc),
    };
    let stats = handle.inner.restore(snap);

    NscRestoreStats {
        applied: stats.applied as u32,
        skipped: stats.skipped as u32,
        rejected: stats.rejected as u32,
        rc: NSC_OK,
    }
}
