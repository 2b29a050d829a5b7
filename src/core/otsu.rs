use crate::core::histogram::Histogram;
use crate::types::{FloodError, FloodResult};

/// Select the change threshold maximizing Otsu between-class variance.
///
/// Every split index `i` partitions the buckets into `[0, i)` and
/// `[i, end)`; the score is `wA * wB * (meanA - meanB)^2` with weighted
/// class means. Splits with an empty class are skipped rather than scored
/// zero. The winning threshold is the mean of the bucket at the split
/// index; exact score ties resolve to the smallest index.
///
/// A histogram whose mass sits in a single bucket has no valid split and
/// yields [`FloodError::HistogramDegenerate`]; callers fall back to the
/// fixed threshold in that case.
pub fn otsu_threshold(histogram: &Histogram) -> FloodResult<f64> {
    let buckets = histogram.buckets();
    if buckets.len() < 2 {
        return Err(FloodError::HistogramDegenerate);
    }

    let total_count: u64 = buckets.iter().map(|b| b.count).sum();
    let total_sum: f64 = buckets.iter().map(|b| b.mean * b.count as f64).sum();

    let mut best: Option<(usize, f64)> = None;
    let mut count_a = 0u64;
    let mut sum_a = 0.0f64;

    for i in 1..buckets.len() {
        count_a += buckets[i - 1].count;
        sum_a += buckets[i - 1].mean * buckets[i - 1].count as f64;

        let count_b = total_count - count_a;
        if count_a == 0 || count_b == 0 {
            continue;
        }

        let mean_a = sum_a / count_a as f64;
        let mean_b = (total_sum - sum_a) / count_b as f64;
        let separation = mean_a - mean_b;
        let score = count_a as f64 * count_b as f64 * separation * separation;

        // strict comparison keeps the smallest index on ties
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((i, score)),
        }
    }

    match best {
        Some((index, score)) => {
            let threshold = buckets[index].mean;
            log::debug!(
                "Otsu split at bucket {} of {}, threshold {:.3}, score {:.3}",
                index,
                buckets.len(),
                threshold,
                score
            );
            Ok(threshold)
        }
        None => Err(FloodError::HistogramDegenerate),
    }
}
