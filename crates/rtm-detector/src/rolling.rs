//! Fixed-capacity rolling window with incremental moments.

use std::collections::VecDeque;

/// Rolling window of the most recent samples.
///
/// Mean and variance are maintained with Welford's update on insert and its
/// inverse on eviction. Moments are recomputed from the window after every
/// `capacity` evictions to bound floating-point drift.
#[derive(Debug, Clone)]
pub struct RollingStat {
    samples: VecDeque<f64>,
    capacity: usize,
    mean: f64,
    m2: f64,
    evictions_since_recompute: usize,
    /// Samples ever added (not bounded by the window).
    total: u64,
}

impl RollingStat {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            mean: 0.0,
            m2: 0.0,
            evictions_since_recompute: 0,
            total: 0,
        }
    }

    pub fn push(&mut self, x: f64) {
        if self.samples.len() == self.capacity {
            if let Some(old) = self.samples.pop_front() {
                self.remove_moment(old);
                self.evictions_since_recompute += 1;
            }
        }
        self.samples.push_back(x);
        self.add_moment(x);
        self.total += 1;

        if self.evictions_since_recompute >= self.capacity {
            self.recompute();
        }
    }

    fn add_moment(&mut self, x: f64) {
        let n = self.samples.len() as f64;
        let delta = x - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (x - self.mean);
    }

    /// Inverse Welford step; `samples` already excludes `x`.
    fn remove_moment(&mut self, x: f64) {
        let n = self.samples.len();
        if n == 0 {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let old_mean = self.mean;
        self.mean = (old_mean * (n + 1) as f64 - x) / n as f64;
        self.m2 -= (x - old_mean) * (x - self.mean);
        if self.m2 < 0.0 {
            self.m2 = 0.0;
        }
    }

    fn recompute(&mut self) {
        let n = self.samples.len();
        if n == 0 {
            self.mean = 0.0;
            self.m2 = 0.0;
        } else {
            let mean = self.samples.iter().sum::<f64>() / n as f64;
            self.mean = mean;
            self.m2 = self.samples.iter().map(|x| (x - mean).powi(2)).sum();
        }
        self.evictions_since_recompute = 0;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample standard deviation (n - 1); zero below two samples.
    #[must_use]
    pub fn stddev(&self) -> f64 {
        let n = self.samples.len();
        if n < 2 {
            return 0.0;
        }
        (self.m2 / (n - 1) as f64).sqrt()
    }

    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::min)
    }

    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(samples: &[f64]) -> (f64, f64) {
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        (mean, var.sqrt())
    }

    #[test]
    fn test_matches_naive_within_window() {
        let mut stat = RollingStat::new(10);
        let data = [12.0, 11.5, 12.3, 13.1, 11.9, 12.0, 12.2];
        for x in data {
            stat.push(x);
        }
        let (mean, sd) = naive(&data);
        assert!((stat.mean() - mean).abs() < 1e-12);
        assert!((stat.stddev() - sd).abs() < 1e-12);
    }

    #[test]
    fn test_eviction_keeps_latest_window() {
        let mut stat = RollingStat::new(4);
        for x in 1..=10 {
            stat.push(x as f64);
        }
        assert_eq!(stat.len(), 4);
        assert_eq!(stat.total(), 10);
        let (mean, sd) = naive(&[7.0, 8.0, 9.0, 10.0]);
        assert!((stat.mean() - mean).abs() < 1e-9);
        assert!((stat.stddev() - sd).abs() < 1e-9);
        assert_eq!(stat.min(), Some(7.0));
        assert_eq!(stat.max(), Some(10.0));
    }

    #[test]
    fn test_identical_samples_have_zero_stddev() {
        let mut stat = RollingStat::new(5);
        for _ in 0..20 {
            stat.push(2.5);
        }
        assert_eq!(stat.stddev(), 0.0);
        assert_eq!(stat.mean(), 2.5);
    }

    #[test]
    fn test_single_capacity_window() {
        let mut stat = RollingStat::new(1);
        stat.push(3.0);
        stat.push(4.0);
        assert_eq!(stat.len(), 1);
        assert_eq!(stat.mean(), 4.0);
        assert_eq!(stat.stddev(), 0.0);
    }
}
