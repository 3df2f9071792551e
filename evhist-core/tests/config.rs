#![cfg(feature = "serde")]
use evhist_core::{AxisKind, CollapseMode, Column, HistogramSpec, Ragged, Structure, VariationConfig};

#[test]
fn test_histogram_spec_from_json() {
    let json = r#"{
        "name": "photon_pt",
        "axes": [
            {"coll": "PhotonGood", "field": "pt", "pos": 0,
             "type": "regular", "bins": 10, "start": 0, "stop": 500},
            {"coll": "metadata", "field": "year",
             "type": "str_category", "categories": ["2017", "2018"]}
        ],
        "no_weights": true,
        "collapse_2d_masks": true,
        "collapse_2d_masks_mode": "AND",
        "exclude_categories": ["CRD"]
    }"#;
    let spec: HistogramSpec = serde_json::from_str(json).unwrap();
    assert!(spec.autofill);
    assert!(spec.no_weights);
    assert_eq!(spec.collapse_2d_masks_mode, CollapseMode::And);
    assert!(!spec.accepts_category("CRD"));
    assert_eq!(spec.axes[0].name(), "PhotonGood.pt[0]");
    assert!(matches!(
        spec.axes[0].kind,
        AxisKind::Regular {
            bins: 10,
            flow: true,
            ..
        }
    ));
    assert!(spec.axes[1].is_categorical());
    assert!(spec.validate().is_ok());
}

#[test]
fn test_variation_config_round_trip() {
    let config = VariationConfig::new()
        .with_weight_systematic("pileup")
        .with_shape_systematic_for("SR", "JES");
    let json = serde_json::to_string(&config).unwrap();
    let back: VariationConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
    assert_eq!(back.shape_variations("SR"), vec!["JESUp", "JESDown"]);
}

#[test]
fn test_ragged_offsets_validated_on_load() {
    let ok: Ragged<f64> =
        serde_json::from_str(r#"{"values": [1.0, null, 3.0], "offsets": [0, 2, 3]}"#).unwrap();
    assert_eq!(ok.num_events(), 2);
    assert_eq!(ok.event(0), &[Some(1.0), None]);
    let per_event: Ragged<f64> = serde_json::from_str(r#"{"values": [1.0, 2.0]}"#).unwrap();
    assert_eq!(per_event.ndim(), 1);

    // offsets past the flat values
    assert!(serde_json::from_str::<Ragged<f64>>(r#"{"values": [1.0], "offsets": [0, 5]}"#).is_err());
    // no leading zero, decreasing
    assert!(serde_json::from_str::<Ragged<f64>>(r#"{"values": [1.0], "offsets": [1, 1]}"#).is_err());
    assert!(
        serde_json::from_str::<Ragged<f64>>(r#"{"values": [1.0], "offsets": [0, 2, 1]}"#).is_err()
    );
    assert!(serde_json::from_str::<Column>(
        r#"{"Numeric": {"values": [], "offsets": []}}"#
    )
    .is_err());

    assert!(serde_json::from_str::<Structure>(r#"{"offsets": []}"#).is_err());
    let structure: Structure = serde_json::from_str(r#"{"offsets": [0, 2, 2]}"#).unwrap();
    assert_eq!(structure.len(), 2);
}

#[test]
fn test_ragged_survives_round_trip() {
    let ragged = Ragged::from_nested(vec![vec![1.5, 2.5], vec![], vec![3.5]]);
    let json = serde_json::to_string(&ragged).unwrap();
    let back: Ragged<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ragged);
}
