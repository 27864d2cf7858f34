//! Re-histogramming of time-of-flight histograms onto sorted bins.
//!
//! Converting the edges of a histogram to time-of-flight generally leaves them
//! unsorted, because of frame wrapping or wavelength overlap between sub-frames.
//! This helper spreads the counts of every input bin uniformly over its
//! time-of-flight interval and collects them in sorted bins.
//!
//! Experimental: variances are not supported and the output bin width is the
//! median width of the input bins.

use tofkit_core::{nan_median, nan_min_max, Error, HistogramData, Result, TimeAxis, TofHistogram};

/// Redistributes `hist` onto sorted time-of-flight bins.
///
/// # Errors
/// Returns [`Error::VariancesNotSupported`] if the histogram carries variances, or
/// [`Error::ShapeError`] if no bin has finite time-of-flight edges.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn rehistogram_tof(hist: &TofHistogram) -> Result<HistogramData> {
    if hist.variances.is_some() {
        return Err(Error::VariancesNotSupported("rehistogram_tof"));
    }
    let widths: Vec<f64> = hist
        .tof_edges
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .collect();
    let (lo, hi) = nan_min_max(&hist.tof_edges)
        .ok_or_else(|| Error::ShapeError("no finite time-of-flight edges".to_string()))?;
    let width = nan_median(&widths)
        .filter(|w| *w > 0.0)
        .unwrap_or(hi - lo)
        .max(f64::MIN_POSITIVE);

    let nbins = (((hi - lo) / width).ceil() as usize).max(1);
    let edges: Vec<f64> = (0..=nbins).map(|k| lo + k as f64 * width).collect();
    let mut counts = vec![0.0; nbins];
    let bin_of = |t: f64| (((t - lo) / width).floor() as usize).min(nbins - 1);

    for (pair, &count) in hist.tof_edges.windows(2).zip(&hist.counts) {
        // Masked edges stay missing.
        if !(pair[0].is_finite() && pair[1].is_finite()) {
            continue;
        }
        let (a, b) = (pair[0].min(pair[1]), pair[0].max(pair[1]));
        if b <= a {
            counts[bin_of(a)] += count;
            continue;
        }
        for k in bin_of(a)..=bin_of(b) {
            let overlap = b.min(edges[k + 1]) - a.max(edges[k]);
            if overlap > 0.0 {
                counts[k] += count * overlap / (b - a);
            }
        }
    }
    HistogramData::new(TimeAxis::Tof, edges, counts, None, hist.ltotal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_counts_are_conserved() {
        let hist = TofHistogram {
            tof_edges: vec![30.0, 40.0, 50.0, 10.0, 20.0],
            counts: vec![5.0, 3.0, 8.0, 2.0],
            variances: None,
            ltotal: 10.0,
        };
        let out = rehistogram_tof(&hist).unwrap();
        assert!(out.edges().windows(2).all(|w| w[0] < w[1]));
        assert_relative_eq!(out.edges()[0], 10.0);
        let total: f64 = out.counts().iter().sum();
        assert_relative_eq!(total, 18.0, epsilon = 1e-9);
        // [30, 40] gets the first input bin and a quarter of the wrapped [10, 50] bin.
        assert_relative_eq!(out.counts()[2], 7.0, epsilon = 1e-9);
        assert_relative_eq!(out.counts()[0], 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nan_edges_are_skipped() {
        let hist = TofHistogram {
            tof_edges: vec![0.0, 10.0, f64::NAN, 30.0],
            counts: vec![4.0, 1.0, 1.0],
            variances: None,
            ltotal: 10.0,
        };
        let out = rehistogram_tof(&hist).unwrap();
        let total: f64 = out.counts().iter().sum();
        assert_relative_eq!(total, 4.0, epsilon = 1e-9);
        // Nothing from the masked bins lands at their finite edges.
        let last = out.counts().len() - 1;
        assert_relative_eq!(out.counts()[last], 0.0);
    }

    #[test]
    fn test_single_masked_edge_drops_its_bin() {
        let hist = TofHistogram {
            tof_edges: vec![f64::NAN, 10.0, 20.0],
            counts: vec![7.0, 2.0],
            variances: None,
            ltotal: 10.0,
        };
        let out = rehistogram_tof(&hist).unwrap();
        let total: f64 = out.counts().iter().sum();
        assert_relative_eq!(total, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_variances_are_rejected() {
        let hist = TofHistogram {
            tof_edges: vec![0.0, 1.0],
            counts: vec![1.0],
            variances: Some(vec![1.0]),
            ltotal: 10.0,
        };
        assert!(matches!(
            rehistogram_tof(&hist),
            Err(Error::VariancesNotSupported(_))
        ));
    }
}
