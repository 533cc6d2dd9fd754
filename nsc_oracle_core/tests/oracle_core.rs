use nsc_oracle_core::*;

const TARGET: &str = "0x00000000000000000000000000000000000000a1";

fn params(schema: OutcomeSchema) -> TaskParams {
    TaskParams {
        market_title: "Will BTC close above $60k?".to_string(),
        labels: LabelSet::new("Yes", "No").unwrap(),
        url: "https://coinmarketcap.com/currencies/bitcoin/".to_string(),
        mode: RenderMode::Text,
        schema,
        instruction: "Extract the price.".to_string(),
    }
}

fn engine(executors: usize) -> EquivalenceEngine {
    EquivalenceEngine::new(OracleCfg { executor_count: executors, ..OracleCfg::default() })
}

fn comparative() -> Policy {
    Policy::Comparative { principle: "same announcement_found, same winner".to_string() }
}

#[test]
fn strict_accepts_identical_outputs() {
    let out = r#"{"price": 65000.50, "winner": "Yes"}"#;
    let task = ReplayTask::new([out, out, out]);
    let outcome = engine(3)
        .resolve(&task, &params(OutcomeSchema::PriceAndWinner), &Policy::Strict)
        .unwrap();
    assert_eq!(outcome.executors, 3);
    assert_eq!(outcome.candidate.price, Some(65000.50));
    assert_eq!(outcome.candidate.winner.as_deref(), Some("Yes"));
    assert_eq!(outcome.leader_stage, ParseStage::Direct);
}

#[test]
fn strict_rejects_one_divergent_executor() {
    let out = r#"{"price": 65000.50, "winner": "Yes"}"#;
    let task = ReplayTask::new([out, out, r#"{"price": 65000.51, "winner": "Yes"}"#]);
    let err = engine(3)
        .resolve(&task, &params(OutcomeSchema::PriceAndWinner), &Policy::Strict)
        .unwrap_err();
    assert!(matches!(err, OracleError::Disagreement { executor: 2, .. }), "{err}");
}

#[test]
fn strict_parsed_layer_ignores_formatting_but_raw_does_not() {
    let task = ReplayTask::new([
        r#"{"price": 65000.50, "winner": "Yes"}"#,
        "```json\n{\"winner\":\"Yes\",\"price\":65000.5}\n```",
    ]);
    let p = params(OutcomeSchema::PriceAndWinner);
    assert!(engine(2).resolve(&task, &p, &Policy::Strict).is_ok());

    let raw = EquivalenceEngine::new(OracleCfg {
        executor_count: 2,
        strict_layer: StrictLayer::Raw,
        ..OracleCfg::default()
    });
    let err = raw.resolve(&task, &p, &Policy::Strict).unwrap_err();
    assert!(matches!(err, OracleError::Disagreement { executor: 1, .. }));
}

#[test]
fn comparative_accepts_different_phrasing() {
    let task = ReplayTask::new([
        r#"{"announcement_found": true, "winner": "Yes", "reasoning": "Headline confirms it."}"#,
        "Found it. {'announcement_found': true, 'winner': 'Yes', 'reasoning': 'Top story says so',}",
    ]);
    let outcome = engine(2)
        .resolve(&task, &params(OutcomeSchema::FlagAndWinner), &comparative())
        .unwrap();
    assert_eq!(outcome.candidate.flag, Some(true));
    assert_eq!(outcome.candidate.winner.as_deref(), Some("Yes"));
    assert_eq!(outcome.candidate.resolved_value(), 1);
}

#[test]
fn comparative_rejects_different_winner() {
    let task = ReplayTask::new([
        r#"{"announcement_found": true, "winner": "Yes"}"#,
        r#"{"announcement_found": true, "winner": "No"}"#,
    ]);
    let err = engine(2)
        .resolve(&task, &params(OutcomeSchema::FlagAndWinner), &comparative())
        .unwrap_err();
    assert!(matches!(err, OracleError::Disagreement { executor: 1, .. }));
}

#[test]
fn comparative_rejects_different_flag() {
    let task = ReplayTask::new([
        r#"{"announcement_found": true, "winner": "No"}"#,
        r#"{"announcement_found": false, "winner": "No"}"#,
    ]);
    assert!(engine(2)
        .resolve(&task, &params(OutcomeSchema::FlagAndWinner), &comparative())
        .is_err());
}

#[test]
fn comparator_can_veto() {
    let out = r#"{"announcement_found": false, "winner": "No"}"#;
    let task = ReplayTask::new([out, out]);
    let veto = |_: &str, _: &Execution, _: &Execution| Ok::<bool, TaskError>(false);
    let err = engine(2)
        .with_comparator(veto)
        .resolve(&task, &params(OutcomeSchema::FlagAndWinner), &comparative())
        .unwrap_err();
    assert!(matches!(err, OracleError::Disagreement { .. }));
}

#[test]
fn comparative_price_tolerance() {
    let task = ReplayTask::new([
        r#"{"price": 100.00, "winner": "Yes"}"#,
        r#"{"price": 100.40, "winner": "Yes"}"#,
    ]);
    let p = params(OutcomeSchema::PriceAndWinner);
    let tolerant = EquivalenceEngine::new(OracleCfg {
        executor_count: 2,
        price_tolerance_bps: Some(50),
        ..OracleCfg::default()
    });
    let outcome = tolerant.resolve(&task, &p, &comparative()).unwrap();
    assert_eq!(outcome.candidate.price_minor_units(), 10_000);

    let tight = EquivalenceEngine::new(OracleCfg {
        executor_count: 2,
        price_tolerance_bps: Some(10),
        ..OracleCfg::default()
    });
    assert!(tight.resolve(&task, &p, &comparative()).is_err());
}

#[test]
fn executor_failure_aborts() {
    let task = |executor: usize, _: &TaskParams| -> Result<TaskOutput, TaskError> {
        if executor == 1 {
            Err(TaskError::new("render timed out"))
        } else {
            Ok(TaskOutput::text(r#"{"price": 1, "winner": "Yes"}"#))
        }
    };
    let err = engine(2)
        .resolve(&task, &params(OutcomeSchema::PriceAndWinner), &Policy::Strict)
        .unwrap_err();
    assert_eq!(err, OracleError::Task { executor: 1, reason: "render timed out".to_string() });
}

#[test]
fn zero_executors_is_a_validation_error() {
    let task = ReplayTask::default();
    let err = engine(1)
        .resolve_with(&task, &params(OutcomeSchema::PriceAndWinner), &Policy::Strict, 0)
        .unwrap_err();
    assert!(matches!(err, OracleError::Validation { .. }));
}

#[test]
fn total_parse_failure_resolves_to_default() {
    let task = ReplayTask::new(["I could not read the page", "Error: blocked"]);
    let outcome = engine(2)
        .resolve(&task, &params(OutcomeSchema::FlagAndWinner), &Policy::Strict)
        .unwrap();
    assert_eq!(outcome.leader_stage, ParseStage::Default);
    assert_eq!(outcome.candidate.flag, Some(false));
    assert_eq!(outcome.candidate.winner.as_deref(), Some("Yes"));
}

#[test]
fn m1_scenario_end_to_end() {
    let market = Market::new("m1", "BTC above 60k?", "Yes", "No")
        .unwrap()
        .with_target(TARGET.parse().unwrap());
    let out = r#"{"price": 65000.50, "winner": "Yes"}"#;
    let task = ReplayTask::new([out, out]);
    let outcome = engine(2)
        .resolve(&task, &params(OutcomeSchema::PriceAndWinner), &Policy::Strict)
        .unwrap();

    let at = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let record = ResolutionRecord::new(&market, &outcome, "https://example.test", at).unwrap();
    assert_eq!(record.price_minor, 6_500_050);
    assert_eq!(record.winner, "Yes");
    assert!(record.side_a_wins);
    assert_eq!(record.price_dollars(), "$65000.50");

    let env = encode(&market, &outcome, record.timestamp().unwrap()).unwrap();
    let (target, tuple) = decode_envelope(&env.bytes).unwrap();
    assert_eq!(target, market.target.unwrap());
    assert!(tuple.side_a_wins);
    assert!(!tuple.undetermined);
    assert_eq!(tuple.value, 6_500_050);
    assert_eq!(tuple.timestamp, 1_700_000_000);
    assert_eq!(tuple.winner, "Yes");
}

#[test]
fn inner_tuple_round_trips() {
    let market = Market::new(TARGET, "Rate cut announced?", "Cut", "Hold").unwrap();
    let outcome = ConsensusOutcome {
        candidate: ParsedCandidate { price: None, flag: Some(false), winner: Some("Hold".into()) },
        leader_stage: ParseStage::FieldScan,
        executors: 3,
    };
    let env = encode(&market, &outcome, 1_234).unwrap();
    let tuple = decode_resolution(&env.payload).unwrap();
    assert_eq!(
        tuple,
        ResolutionTuple {
            target: TARGET.parse().unwrap(),
            side_a_wins: false,
            undetermined: false,
            timestamp: 1_234,
            proof_hash: [0u8; 32],
            value: 0,
            winner: "Hold".to_string(),
        }
    );
    // 7 head words + string length word + one padded data word.
    assert_eq!(env.payload.len(), 32 * 9);
}

#[test]
fn outer_tuple_layout() {
    let market = Market::new(TARGET, "t", "Yes", "No").unwrap();
    let outcome = ConsensusOutcome {
        candidate: ParsedCandidate { price: Some(2.5), flag: None, winner: Some("No".into()) },
        leader_stage: ParseStage::Direct,
        executors: 1,
    };
    let env = encode(&market, &outcome, 7).unwrap();
    assert_eq!(&env.bytes[12..32], market.target.unwrap().as_bytes());
    assert_eq!(env.bytes[63], 0x40);
    assert_eq!(env.bytes[95] as usize, env.payload.len() % 256);
    assert_eq!(&env.bytes[96..96 + env.payload.len()], env.payload.as_slice());
    assert_eq!(encode(&market, &outcome, 7).unwrap(), env);
}

#[test]
fn missing_target_is_a_schema_error() {
    let market = Market::new("m1", "t", "Yes", "No").unwrap();
    let outcome = ConsensusOutcome {
        candidate: ParsedCandidate { price: None, flag: None, winner: Some("Yes".into()) },
        leader_stage: ParseStage::Direct,
        executors: 1,
    };
    assert!(matches!(encode(&market, &outcome, 0), Err(OracleError::Schema { .. })));
}
