#![allow(clippy::cast_precision_loss)]
use approx::assert_relative_eq;
use evhist_core::{
    AxisSpec, Collection, EventTable, HistogramSpec, Selection, VariationConfig, NOMINAL,
};
use evhist_fill::{accumulate_chunks, FillInputs, HistManager, SampleInfo, WeightSet};

struct Chunk {
    events: EventTable,
    categories: Selection,
    weights: WeightSet,
}

fn chunk(offset: f64, counts: &[usize]) -> Chunk {
    let n = counts.len();
    let total: usize = counts.iter().sum();
    let pt = (0..total).map(|i| offset + 10.0 * i as f64).collect();
    let photons = Collection::from_counts(counts).with_values("pt", pt).unwrap();
    let met = (0..n).map(|i| offset + i as f64).collect::<Vec<f64>>();
    let sr: Vec<bool> = (0..n).map(|i| i % 2 == 0).collect();
    let cr: Vec<bool> = sr.iter().map(|keep| !keep).collect();
    Chunk {
        events: EventTable::new(n)
            .with_field("met", met)
            .unwrap()
            .with_collection("PhotonGood", photons)
            .unwrap(),
        categories: Selection::new().with_mask("SR", sr).with_mask("CR", cr),
        weights: WeightSet::new((0..n).map(|i| 0.5 + i as f64).collect())
            .with_variation("pileupUp", vec![2.0; n])
            .with_variation("pileupDown", vec![0.5; n]),
    }
}

fn manager() -> HistManager {
    HistManager::new(
        vec![
            HistogramSpec::new(
                "met",
                vec![AxisSpec::regular("events", "met", 20, 0.0, 100.0)],
            ),
            HistogramSpec::new(
                "photon_pt",
                vec![AxisSpec::regular("PhotonGood", "pt", 20, 0.0, 400.0)],
            ),
        ],
        SampleInfo::simulated("TTG"),
        &["SR", "CR"],
        VariationConfig::new().with_weight_systematic("pileup"),
    )
    .unwrap()
}

fn fill(manager: &mut HistManager, chunk: &Chunk) -> evhist_fill::Result<()> {
    manager.fill_histograms(&FillInputs::new(
        &chunk.events,
        &chunk.categories,
        &chunk.weights,
    ))?;
    Ok(())
}

#[test]
fn test_parallel_matches_sequential() {
    let chunks = vec![
        chunk(0.0, &[1, 0, 2, 3]),
        chunk(20.0, &[2, 2]),
        chunk(40.0, &[0, 0, 1, 1, 4]),
        chunk(60.0, &[3]),
    ];

    let mut sequential = manager();
    for chunk in &chunks {
        fill(&mut sequential, chunk).unwrap();
    }

    let template = manager();
    let merged = accumulate_chunks(&template, &chunks, fill).unwrap();

    assert_eq!(merged.len(), sequential.histograms().len());
    for (variable, subsample, hist) in sequential.histograms().iter() {
        let other = merged.get(variable, subsample).unwrap();
        for category in ["SR", "CR"] {
            for variation in [NOMINAL, "pileupUp", "pileupDown"] {
                let expected = hist.values(category, Some(variation)).unwrap();
                let found = other.values(category, Some(variation)).unwrap();
                for (a, b) in expected.iter().zip(found.iter()) {
                    assert_relative_eq!(*a, *b, epsilon = 1e-9);
                }
            }
        }
    }
    // the template itself is never filled
    assert_relative_eq!(template.histograms().iter().map(|(_, _, h)| h.total()).sum::<f64>(), 0.0);
}

#[test]
fn test_parallel_propagates_errors() {
    let mut bad = chunk(0.0, &[1, 1]);
    bad.weights = WeightSet::new(vec![1.0]);
    let chunks = vec![chunk(0.0, &[1, 2]), bad];
    assert!(accumulate_chunks(&manager(), &chunks, fill).is_err());
}
