#![cfg(feature = "serde")]
use evhist_fill::{ProcessingPass, SampleKind, StrategyTable};

#[test]
fn test_strategy_table_from_json() {
    let json = r#"{
        "PLJ": {"collection_remap": {"PhotonGood": "PhotonPLJ"}, "correction": "extrapolation"},
        "CRB": {"collection_remap": {"PhotonGood": "PhotonCRB"}}
    }"#;
    let table: StrategyTable = serde_json::from_str(json).unwrap();
    let plj = table.get("PLJ").unwrap();
    assert_eq!(plj.collection_remap["PhotonGood"], "PhotonPLJ");
    assert_eq!(plj.correction.as_deref(), Some("extrapolation"));
    assert!(table.get("CRB").unwrap().correction.is_none());
    assert!(table.get("SR").is_none());
}

#[test]
fn test_pass_and_kind_labels() {
    let pass: ProcessingPass = serde_json::from_str(r#"{"shape": "JESUp"}"#).unwrap();
    assert_eq!(pass, ProcessingPass::Shape("JESUp".to_string()));
    let nominal: ProcessingPass = serde_json::from_str(r#""nominal""#).unwrap();
    assert!(nominal.is_nominal());
    let kind: SampleKind = serde_json::from_str(r#""observed""#).unwrap();
    assert_eq!(kind, SampleKind::Observed);
}
