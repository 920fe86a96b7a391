//! Running statistics over edge lengths and node ages.
//!
//! Sums are kept as 128-bit fixed-point integers with 64 fractional bits. Converting a
//! sample to fixed point is deterministic, and integer addition is associative and
//! commutative, so two accumulators fed the same samples in any order and merged in any
//! grouping hold bit-identical sums. Plain `f64` addition would not.

use serde::{Deserialize, Serialize};

/// 2^64, the fixed-point scale.
const FIXED_SCALE: f64 = 18_446_744_073_709_551_616.0;

/// Probability mass covered by the reported HPD interval.
pub const HPD_MASS: f64 = 0.95;

#[inline]
fn to_fixed(v: f64) -> i128 {
    (v * FIXED_SCALE) as i128
}

#[inline]
fn from_fixed(v: i128) -> f64 {
    v as f64 / FIXED_SCALE
}

/// Count, exact sums, range and (optionally) raw samples of one quantity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SampleStats {
    count: u64,
    #[serde(with = "fixed_repr")]
    sum: i128,
    #[serde(with = "fixed_repr")]
    sum_sq: i128,
    min: Option<f64>,
    max: Option<f64>,
    samples: Option<Vec<f64>>,
}

impl SampleStats {
    /// Creates an empty accumulator; `keep_samples` retains raw values for medians and HPD.
    pub fn new(keep_samples: bool) -> Self {
        SampleStats {
            count: 0,
            sum: 0,
            sum_sq: 0,
            min: None,
            max: None,
            samples: keep_samples.then(Vec::new),
        }
    }

    /// Folds one value in. Count, sums and range are always updated together.
    pub fn push(&mut self, v: f64) {
        self.count += 1;
        self.sum = self.sum.saturating_add(to_fixed(v));
        self.sum_sq = self.sum_sq.saturating_add(to_fixed(v * v));
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
        if let Some(samples) = self.samples.as_mut() {
            samples.push(v);
        }
    }

    /// Adds all values seen by `other`.
    ///
    /// If only one side keeps samples, the result does not: a partial sample list would
    /// silently bias medians.
    pub fn merge(&mut self, other: &SampleStats) {
        self.count += other.count;
        self.sum = self.sum.saturating_add(other.sum);
        self.sum_sq = self.sum_sq.saturating_add(other.sum_sq);
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        match (self.samples.as_mut(), other.samples.as_ref()) {
            (Some(mine), Some(theirs)) => mine.extend_from_slice(theirs),
            _ => self.samples = None,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn keeps_samples(&self) -> bool {
        self.samples.is_some()
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| from_fixed(self.sum) / self.count as f64)
    }

    /// Sample standard deviation (n - 1 denominator); `None` for fewer than two values.
    pub fn std_dev(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        let n = self.count as f64;
        let variance = match self.sorted_samples() {
            Some(sorted) => {
                let mean = self.mean()?;
                sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
            }
            None => {
                let sum = from_fixed(self.sum);
                (from_fixed(self.sum_sq) - sum * sum / n) / (n - 1.0)
            }
        };
        Some(variance.max(0.0).sqrt())
    }

    pub fn range(&self) -> Option<(f64, f64)> {
        Some((self.min?, self.max?))
    }

    /// Median of the raw samples; `None` if samples are not kept or empty.
    pub fn median(&self) -> Option<f64> {
        let sorted = self.sorted_samples()?;
        let n = sorted.len();
        match n {
            0 => None,
            _ if n % 2 == 1 => Some(sorted[n / 2]),
            _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
        }
    }

    /// Shortest interval containing `mass` of the samples (highest posterior density).
    pub fn hpd(&self, mass: f64) -> Option<(f64, f64)> {
        let sorted = self.sorted_samples()?;
        let n = sorted.len();
        if n == 0 {
            return None;
        }
        let width = ((mass * n as f64).ceil() as usize).clamp(1, n);
        (0..=n - width)
            .map(|i| (sorted[i], sorted[i + width - 1]))
            .min_by(|a, b| (a.1 - a.0).total_cmp(&(b.1 - b.0)))
    }

    /// Mean, median, deviation, range and 95% HPD in one go.
    pub fn summary(&self) -> Option<Summary> {
        Some(Summary {
            mean: self.mean()?,
            median: self.median(),
            std_dev: self.std_dev(),
            range: self.range()?,
            hpd95: self.hpd(HPD_MASS),
        })
    }

    fn sorted_samples(&self) -> Option<Vec<f64>> {
        let mut sorted = self.samples.clone()?;
        sorted.sort_by(f64::total_cmp);
        Some(sorted)
    }
}

impl PartialEq for SampleStats {
    /// Samples compare as multisets; their order depends on absorption order.
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count
            && self.sum == other.sum
            && self.sum_sq == other.sum_sq
            && self.min == other.min
            && self.max == other.max
            && self.sorted_samples() == other.sorted_samples()
    }
}

/// Summary statistics of one quantity, ready for annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub range: (f64, f64),
    pub hpd95: Option<(f64, f64)>,
}

/// `i128` does not survive every serde format intact, so it travels as a decimal string.
mod fixed_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &i128, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i128, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn filled(values: &[f64]) -> SampleStats {
        let mut stats = SampleStats::new(true);
        values.iter().for_each(|&v| stats.push(v));
        stats
    }

    #[test]
    fn test_mean_median_range() {
        let stats = filled(&[2.0, 4.0]);
        assert_eq!(stats.mean(), Some(3.0));
        assert_eq!(stats.median(), Some(3.0));
        assert_eq!(stats.range(), Some((2.0, 4.0)));

        let odd = filled(&[5.0, 1.0, 3.0]);
        assert_eq!(odd.median(), Some(3.0));
    }

    #[test]
    fn test_std_dev_with_and_without_samples() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let with = filled(&values);
        let mut without = SampleStats::new(false);
        values.iter().for_each(|&v| without.push(v));

        let expected = (5.0f64 / 3.0).sqrt();
        assert!((with.std_dev().unwrap() - expected).abs() < 1e-12);
        assert!((without.std_dev().unwrap() - expected).abs() < 1e-9);
        assert_eq!(without.median(), None);
        assert_eq!(filled(&[1.0]).std_dev(), None);
    }

    #[test]
    fn test_hpd_is_shortest_window() {
        // 20 values: 19 tightly packed and one outlier
        let mut values: Vec<f64> = (0..19).map(|i| 1.0 + i as f64 * 0.01).collect();
        values.push(100.0);
        let stats = filled(&values);
        let (lo, hi) = stats.hpd(HPD_MASS).unwrap();
        assert_eq!(lo, 1.0);
        assert!((hi - 1.18).abs() < 1e-12);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let chunks = [vec![0.1, 0.7], vec![0.2], vec![1e-9, 3.3, 0.3]];
        let reference = {
            let mut acc = SampleStats::new(true);
            chunks.iter().for_each(|c| acc.merge(&filled(c)));
            acc
        };
        for order in (0..chunks.len()).permutations(chunks.len()) {
            let mut acc = SampleStats::new(true);
            for i in order {
                acc.merge(&filled(&chunks[i]));
            }
            assert_eq!(acc, reference);
            assert_eq!(acc.mean(), reference.mean());
        }
    }

    #[test]
    fn test_merge_drops_partial_samples() {
        let mut with = filled(&[1.0]);
        let mut without = SampleStats::new(false);
        without.push(2.0);
        with.merge(&without);
        assert!(!with.keeps_samples());
        assert_eq!(with.count(), 2);
        assert_eq!(with.mean(), Some(1.5));
    }

    #[test]
    fn test_json_round_trip() {
        let stats = filled(&[0.25, 1.5]);
        let json = serde_json::to_string(&stats).unwrap();
        let back: SampleStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn test_empty_has_no_summary() {
        assert!(SampleStats::new(true).summary().is_none());
        let summary = filled(&[2.0, 4.0]).summary().unwrap();
        assert_eq!(summary.mean, 3.0);
        assert_eq!(summary.hpd95, Some((2.0, 4.0)));
    }
}
