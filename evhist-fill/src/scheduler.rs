//! Parallel accumulation over independent chunks.

use evhist_core::error::Result;
use evhist_core::histogram::HistogramSet;
use log::debug;
use rayon::prelude::*;

use crate::manager::HistManager;

/// Fills a fresh copy of `manager` per chunk in parallel and merges the
/// results in chunk order.
///
/// `fill` receives an empty manager with the same booking and one chunk; it
/// typically builds [`FillInputs`](crate::FillInputs) for the chunk and calls
/// [`HistManager::fill_histograms`]. Because fills are additive the merged
/// set equals filling every chunk into one manager.
///
/// # Errors
/// Returns the first error raised by `fill` or by the merge.
pub fn accumulate_chunks<C, F>(manager: &HistManager, chunks: &[C], fill: F) -> Result<HistogramSet>
where
    C: Sync,
    F: Fn(&mut HistManager, &C) -> Result<()> + Sync,
{
    let partials: Vec<Result<HistogramSet>> = chunks
        .par_iter()
        .map(|chunk| {
            let mut worker = manager.fresh();
            fill(&mut worker, chunk)?;
            Ok(worker.into_histograms())
        })
        .collect();

    let mut merged = manager.fresh().into_histograms();
    for partial in partials {
        merged.merge(partial?)?;
    }
    debug!(
        "merged {} chunks into {} histograms",
        chunks.len(),
        merged.len()
    );
    Ok(merged)
}
