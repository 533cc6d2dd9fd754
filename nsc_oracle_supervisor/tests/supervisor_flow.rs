use std::sync::Arc;

use chrono::DateTime;
use nsc_oracle_core::{decode_envelope, Address, OracleCfg, OracleError, ParseStage, ReplayTask, TaskError, TaskOutput, TaskParams};
use nsc_oracle_supervisor::*;

const TARGET: &str = "0x1111111111111111111111111111111111111111";

fn cfg(executors: usize) -> OracleCfg {
    OracleCfg { executor_count: executors, ..OracleCfg::default() }
}

fn bridged(executors: usize) -> MarketSupervisor<Arc<OutboxTransport>> {
    MarketSupervisor::new(4, cfg(executors), Arc::new(OutboxTransport::new()))
        .unwrap()
        .with_bridge(BridgeCfg::new(40245, "0xfactory"))
}

fn btc_request(id: &str) -> MarketRequest<'_> {
    MarketRequest::new(id, "Will BTC close above 60k?", "Yes", "No", MarketVariant::crypto("btc", "Bitcoin"))
        .with_target(TARGET.parse().unwrap())
}

#[test]
fn crypto_market_resolves_and_dispatches() {
    let sup = bridged(3);
    let out = r#"{"price": 65000.50, "winner": "Yes"}"#;
    let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    let record = sup
        .create_market_at(&btc_request("m1"), &ReplayTask::new([out, out, out]), at)
        .unwrap();
    assert_eq!(record.price_minor, 6_500_050);
    assert!(record.side_a_wins);
    assert_eq!(record.leader_stage, ParseStage::Direct);
    assert_eq!(record.resolution_url, "https://coinmarketcap.com/currencies/bitcoin/");

    let msg = sup.transport().pop().unwrap();
    assert_eq!(msg.destination_chain_id, 40245);
    assert_eq!(msg.destination_contract, "0xfactory");
    let (target, tuple) = decode_envelope(&msg.payload).unwrap();
    assert_eq!(target, TARGET.parse::<Address>().unwrap());
    assert_eq!(tuple.value, 6_500_050);
    assert_eq!(tuple.timestamp, 1_700_000_000);
    assert_eq!(tuple.winner, "Yes");
    assert!(sup.transport().is_empty());

    let details = sup.details("m1").unwrap();
    assert_eq!(details.resolved_price, "$65000.50");
    assert_eq!(details.winning_side, "Yes");
    assert_eq!(details.announcement_found, None);
}

#[test]
fn news_market_uses_comparative_check() {
    let sup = MarketSupervisor::new(1, cfg(2), LogTransport).unwrap();
    let req = MarketRequest::new(
        "n1",
        "Will the EU announce a new trade pact?",
        "Yes",
        "No",
        MarketVariant::news("EU").unwrap(),
    );
    let task = ReplayTask::new([
        r#"{"announcement_found": true, "winner": "Yes", "reasoning": "headline confirms"}"#,
        r#"```json
{'announcement_found': true, 'winner': 'Yes', 'reasoning': 'front page lead story'}
```"#,
    ]);
    let record = sup.create_market(&req, &task).unwrap();
    assert_eq!(record.flag, Some(true));
    assert_eq!(record.price_minor, 1);
    assert_eq!(record.resolution_url, "https://www.bbc.com/news/world/europe");
}

#[test]
fn unknown_region_is_rejected_before_running() {
    assert!(matches!(MarketVariant::news("OC"), Err(OracleError::Validation { .. })));
}

#[test]
fn duplicate_market_is_rejected() {
    let sup = bridged(1);
    let task = ReplayTask::new([r#"{"price": 1.0, "winner": "No"}"#]);
    sup.create_market(&btc_request("m1"), &task).unwrap();

    let err = sup.create_market(&btc_request("m1"), &task).unwrap_err();
    assert!(matches!(err, OracleError::Validation { .. }));
    assert_eq!(sup.len(), 1);
    assert_eq!(sup.transport().len(), 1);
}

#[test]
fn disagreement_leaves_no_trace() {
    let sup = bridged(3);
    let task = ReplayTask::new([
        r#"{"price": 65000.50, "winner": "Yes"}"#,
        r#"{"price": 65000.50, "winner": "Yes"}"#,
        r#"{"price": 64999.00, "winner": "Yes"}"#,
    ]);
    let err = sup.create_market(&btc_request("m1"), &task).unwrap_err();
    assert!(matches!(err, OracleError::Disagreement { executor: 2, .. }));
    assert!(sup.get("m1").is_none());
    assert!(sup.is_empty());
    assert!(sup.transport().is_empty());
}

#[test]
fn task_failure_leaves_no_trace() {
    let sup = bridged(2);
    let task = |executor: usize, _: &TaskParams| -> Result<TaskOutput, TaskError> {
        if executor == 0 {
            Ok(TaskOutput::text(r#"{"price": 10, "winner": "Yes"}"#))
        } else {
            Err(TaskError::new("render timed out"))
        }
    };
    let err = sup.create_market(&btc_request("m1"), &task).unwrap_err();
    assert!(matches!(err, OracleError::Task { executor: 1, .. }));
    assert!(sup.is_empty());
    assert!(sup.transport().is_empty());
}

#[test]
fn bridged_market_needs_a_target() {
    let sup = bridged(1);
    let req = MarketRequest::new("m1", "BTC?", "Yes", "No", MarketVariant::crypto("BTC", "Bitcoin"));
    let task = ReplayTask::new([r#"{"price": 1.0, "winner": "Yes"}"#]);
    let err = sup.create_market(&req, &task).unwrap_err();
    assert!(matches!(err, OracleError::Validation { .. }));

    // Without a bridge the record is kept locally only.
    let local = MarketSupervisor::new(1, cfg(1), LogTransport).unwrap();
    assert!(local.create_market(&req, &task).is_ok());
    assert_eq!(local.market_ids(), vec!["m1".to_string()]);
}

#[test]
fn market_id_doubles_as_target() {
    let sup = bridged(1);
    let req = MarketRequest::new(TARGET, "BTC?", "Yes", "No", MarketVariant::crypto("BTC", "Bitcoin"));
    let task = ReplayTask::new([r#"{"price": 1.0, "winner": "No"}"#]);
    sup.create_market(&req, &task).unwrap();
    let msg = sup.transport().pop().unwrap();
    let (target, tuple) = decode_envelope(&msg.payload).unwrap();
    assert_eq!(target.to_string(), TARGET);
    assert!(!tuple.side_a_wins);
}

#[test]
fn snapshot_restore_roundtrip() {
    let sup = bridged(1);
    for id in ["m3", "m1", "m2"] {
        let task = ReplayTask::new([r#"{"price": 2.5, "winner": "Yes"}"#]);
        sup.create_market(&btc_request(id), &task).unwrap();
    }
    let snap = sup.snapshot();
    let ids: Vec<&str> = snap.markets.iter().map(|m| m.record.market_id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);

    let bytes = snap.to_json().unwrap();
    let back = SupervisorSnapshot::from_json(&bytes).unwrap();
    assert_eq!(back, snap);

    let fresh = MarketSupervisor::new(2, cfg(1), LogTransport).unwrap();
    let stats = fresh.restore(back.clone());
    assert_eq!(stats, RestoreStats { applied: 3, skipped: 0, rejected: 0 });
    assert_eq!(fresh.get("m2"), sup.get("m2"));

    // Restoring again changes nothing.
    let stats = fresh.restore(back);
    assert_eq!(stats, RestoreStats { applied: 0, skipped: 3, rejected: 0 });
    assert_eq!(fresh.len(), 3);

    assert!(matches!(SupervisorSnapshot::from_json(b"not json"), Err(OracleError::Snapshot { .. })));
}

#[test]
fn restore_never_replaces_a_resolved_record() {
    let sup = bridged(1);
    let task = ReplayTask::new([r#"{"price": 65000.50, "winner": "Yes"}"#]);
    sup.create_market(&btc_request("m1"), &task).unwrap();
    let original = sup.get("m1").unwrap();

    let mut snap = sup.snapshot();
    snap.markets[0].record.price_minor = 999;
    let stats = sup.restore(snap);
    assert_eq!(stats, RestoreStats { applied: 0, skipped: 1, rejected: 0 });
    assert_eq!(sup.get("m1"), Some(original));
}

#[test]
fn restore_rejects_invalid_entries() {
    let sup = bridged(1);
    let task = ReplayTask::new([r#"{"price": 65000.50, "winner": "Yes"}"#]);
    sup.create_market(&btc_request("m1"), &task).unwrap();
    sup.create_market(&btc_request("m2"), &task).unwrap();

    let mut snap = sup.snapshot();
    snap.markets[0].record.winner = "Maybe".into();
    snap.markets[0].record.side_a_wins = false;
    snap.markets[1].record.side_a_wins = false;

    let fresh = MarketSupervisor::new(1, cfg(1), LogTransport).unwrap();
    let stats = fresh.restore(snap);
    assert_eq!(stats, RestoreStats { applied: 0, skipped: 0, rejected: 2 });
    assert!(fresh.is_empty());
}

#[test]
fn zero_executors_is_rejected_at_construction() {
    let err = MarketSupervisor::new(1, cfg(0), LogTransport).unwrap_err();
    assert!(matches!(err, OracleError::Validation { .. }));
}
