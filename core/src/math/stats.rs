use std::collections::BTreeMap;

pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    /// Population standard deviation.
    pub fn std_dev(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mean = Self::mean(samples);
        let var = samples.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>()
            / samples.len() as f64;
        var.sqrt()
    }

    pub fn median(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    pub fn min(samples: &[f64]) -> f64 {
        samples.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(samples: &[f64]) -> f64 {
        samples.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Centre of the most populated `width`-wide bin over `[0, upper)`.
    /// Ties resolve to the lowest bin; values outside the range are ignored.
    pub fn binned_mode(samples: &[f64], width: f64, upper: f64) -> f64 {
        if width <= 0.0 || upper <= 0.0 {
            return 0.0;
        }
        let last_bin = ((upper / width).ceil() as usize).saturating_sub(1);
        // Only occupied bins are stored.
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &value in samples {
            if value >= 0.0 && value < upper {
                let idx = ((value / width) as usize).min(last_bin);
                *counts.entry(idx).or_default() += 1;
            }
        }
        let mut best = 0;
        let mut best_count = 0;
        for (&idx, &count) in &counts {
            if count > best_count {
                best = idx;
                best_count = count;
            }
        }
        (best as f64 + 0.5) * width
    }
}
