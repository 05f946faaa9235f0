//! Small descriptive-statistics helpers shared by the factor, normalization
//! and trust-weight computations.
//!
//! Every helper returns `None` instead of a degenerate value so that callers
//! can keep "no signal" distinct from a true zero.

/// Round to two decimal places, half away from zero.
pub fn round2(x: f64) -> f64 { (x * 100.0).round() / 100.0 }

pub fn mean(xs: &[f64]) -> Option<f64> {
  if xs.is_empty() {
    return None;
  }
  Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Sample standard deviation (`n - 1` denominator). Requires two values.
pub fn sample_std(xs: &[f64]) -> Option<f64> {
  if xs.len() < 2 {
    return None;
  }
  let mu = mean(xs)?;
  let ss: f64 = xs.iter().map(|x| (x - mu) * (x - mu)).sum();
  Some((ss / (xs.len() - 1) as f64).sqrt())
}

/// Population standard deviation (`n` denominator).
pub fn population_std(xs: &[f64]) -> Option<f64> {
  let mu = mean(xs)?;
  let ss: f64 = xs.iter().map(|x| (x - mu) * (x - mu)).sum();
  Some((ss / xs.len() as f64).sqrt())
}

/// Weighted mean and population standard deviation.
///
/// Pairs with a non-positive weight are ignored; `None` when nothing is left.
pub fn weighted_mean_std(xs: &[f64], ws: &[f64]) -> Option<(f64, f64)> {
  let pairs: Vec<(f64, f64)> = xs
    .iter()
    .zip(ws)
    .filter(|(_, w)| **w > 0.0)
    .map(|(x, w)| (*x, *w))
    .collect();
  let w_sum: f64 = pairs.iter().map(|(_, w)| w).sum();
  if pairs.is_empty() || w_sum <= 0.0 {
    return None;
  }
  let mu = pairs.iter().map(|(x, w)| x * w).sum::<f64>() / w_sum;
  let var = pairs.iter().map(|(x, w)| w * (x - mu) * (x - mu)).sum::<f64>() / w_sum;
  Some((mu, var.sqrt()))
}

/// Median of an unordered slice; mean of the two middle values for even
/// lengths.
pub fn median(xs: &[f64]) -> Option<f64> {
  if xs.is_empty() {
    return None;
  }
  let mut sorted = xs.to_vec();
  sorted.sort_by(f64::total_cmp);
  let mid = sorted.len() / 2;
  if sorted.len() % 2 == 0 {
    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
  } else {
    Some(sorted[mid])
  }
}

/// Lower nearest-rank quantile: the element at index `⌊q·(n-1)⌋` of the
/// sorted values.
pub fn lower_quantile(xs: &[f64], q: f64) -> Option<f64> {
  if xs.is_empty() {
    return None;
  }
  let mut sorted = xs.to_vec();
  sorted.sort_by(f64::total_cmp);
  let idx = (q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).floor() as usize;
  Some(sorted[idx.min(sorted.len() - 1)])
}

/// Clip every value to the `[q, 1 - q]` quantile band of the slice and return
/// the band alongside the clipped values.
pub fn winsorize(xs: &[f64], q: f64) -> (Vec<f64>, Option<(f64, f64)>) {
  if xs.is_empty() || q <= 0.0 {
    return (xs.to_vec(), None);
  }
  let (Some(lo), Some(hi)) = (lower_quantile(xs, q), lower_quantile(xs, 1.0 - q))
  else {
    return (xs.to_vec(), None);
  };
  (xs.iter().map(|x| x.clamp(lo, hi)).collect(), Some((lo, hi)))
}
