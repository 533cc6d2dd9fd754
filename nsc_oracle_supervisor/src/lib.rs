//! nsc_oracle_supervisor
//!
//! Outside-world facing orchestration layer for `nsc_oracle_core`.
//!
//! Responsibilities:
//! - validate market creation requests and build per-variant task inputs
//! - drive the equivalence engine and record the write-once resolution
//! - encode and hand the resolution to the bridge transport
//! - serve resolved markets read-only, snapshot and restore them
//!
//! Non-goals:
//! - no network IO (rendering and prompting are host-provided traits)
//! - no async

pub mod variant;
pub mod dispatch;
pub mod supervisor;

pub use variant::{
    MarketRequest,
    MarketVariant,
    PromptRunner,
    Region,
    Rendered,
    WebPromptTask,
    WebRenderer,
    CONTENT_EXCERPT_CHARS,
};

pub use dispatch::{
    BridgeCfg,
    BridgeDispatcher,
    BridgeTransport,
    LogTransport,
    OutboundMessage,
    OutboxTransport,
};

pub use supervisor::{
    MarketEntry,
    MarketSupervisor,
    ResolutionDetails,
    RestoreStats,
    SupervisorSnapshot,
};
