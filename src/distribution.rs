//! Degree distributions for the LT fountain generator.
//!
//! The generator draws each encoded block's degree from a robust soliton
//! distribution (Luby, "LT Codes", 2002): the ideal soliton `rho` plus a
//! spike-and-tail correction `tau` that keeps a steady supply of degree-1
//! blocks so the peeling decoder never runs dry.

use rand::Rng;

/// Parameters for the robust soliton distribution
#[derive(Debug, Clone, Copy)]
pub struct DistributionParams {
    /// Number of source blocks
    k: usize,
    /// Tuning constant for the size of the ripple
    c: f64,
    /// Failure probability bound
    delta: f64,
}

impl DistributionParams {
    pub fn new(k: usize, c: f64, delta: f64) -> Self {
        Self { k: k.max(1), c, delta }
    }

    /// Expected ripple size `R = c * ln(k / delta) * sqrt(k)`
    fn ripple(&self) -> f64 {
        let k = self.k as f64;
        (self.c * (k / self.delta).ln() * k.sqrt()).max(1.0)
    }
}

impl Default for DistributionParams {
    fn default() -> Self {
        Self::new(1, 0.1, 0.5)
    }
}

/// Degree generator backed by a cumulative robust soliton table
#[derive(Debug, Clone)]
pub struct DegreeGenerator {
    /// (degree, cumulative probability), ascending in both
    distribution: Vec<(usize, f64)>,
}

impl DegreeGenerator {
    /// Build a generator for `k` source blocks with the default tuning
    pub fn new(k: usize) -> Self {
        Self::with_params(DistributionParams {
            k: k.max(1),
            ..DistributionParams::default()
        })
    }

    pub fn with_params(params: DistributionParams) -> Self {
        Self {
            distribution: Self::build_distribution(&params),
        }
    }

    fn build_distribution(params: &DistributionParams) -> Vec<(usize, f64)> {
        let k = params.k;
        if k == 1 {
            return vec![(1, 1.0)];
        }

        let kf = k as f64;
        let r = params.ripple();
        let spike = ((kf / r).floor() as usize).clamp(1, k);

        let mut weights = Vec::with_capacity(k);
        for d in 1..=k {
            let df = d as f64;
            let rho = if d == 1 { 1.0 / kf } else { 1.0 / (df * (df - 1.0)) };
            let tau = if d < spike {
                r / (df * kf)
            } else if d == spike {
                r * (r / params.delta).ln().max(0.0) / kf
            } else {
                0.0
            };
            weights.push((d, rho + tau));
        }

        let total: f64 = weights.iter().map(|&(_, w)| w).sum();
        let mut cum_prob = 0.0;
        let mut dist = Vec::with_capacity(k);
        for (degree, weight) in weights {
            if weight <= 0.0 {
                continue;
            }
            cum_prob += weight / total;
            dist.push((degree, cum_prob));
        }

        // Guard against floating point drift leaving the tail below 1.0
        if let Some(last) = dist.last_mut() {
            last.1 = 1.0;
        }
        dist
    }

    /// Draw a degree from the distribution
    pub fn next_degree<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let p: f64 = rng.gen();
        let pos = self
            .distribution
            .partition_point(|&(_, cum_prob)| cum_prob < p);

        self.distribution
            .get(pos)
            .or_else(|| self.distribution.last())
            .map(|&(degree, _)| degree)
            .unwrap_or(1)
    }

    /// Probability mass assigned to `degree`
    pub fn probability(&self, degree: usize) -> f64 {
        let mut previous = 0.0;
        for &(d, cum_prob) in &self.distribution {
            if d == degree {
                return cum_prob - previous;
            }
            previous = cum_prob;
        }
        0.0
    }

    /// Largest degree this generator can produce
    pub fn max_degree(&self) -> usize {
        self.distribution.last().map(|&(d, _)| d).unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_single_block_is_always_degree_one() {
        let gen = DegreeGenerator::new(1);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(gen.next_degree(&mut rng), 1);
        }
    }

    #[test]
    fn test_degree_distribution() {
        let gen = DegreeGenerator::new(100);
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = HashMap::new();

        for _ in 0..10000 {
            let degree = gen.next_degree(&mut rng);
            assert!((1..=100).contains(&degree));
            *counts.entry(degree).or_insert(0usize) += 1;
        }

        // Degree 1 must show up often enough to bootstrap peeling
        assert!(counts.get(&1).copied().unwrap_or(0) > 300);
        // Degree 2 is the mode of the soliton family
        let twos = counts.get(&2).copied().unwrap_or(0);
        assert!(counts.values().all(|&c| c <= twos));
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        for k in [2, 10, 25, 64, 250] {
            let gen = DegreeGenerator::new(k);
            let total: f64 = (1..=k).map(|d| gen.probability(d)).sum();
            assert!((total - 1.0).abs() < 1e-9, "k = {k}, total = {total}");
            assert!(gen.probability(1) > 0.0);
            assert!(gen.max_degree() <= k);
        }
    }

    #[test]
    fn test_spike_is_present() {
        let params = DistributionParams::new(100, 0.1, 0.5);
        let gen = DegreeGenerator::with_params(params);
        let spike = (100.0 / params.ripple()).floor() as usize;
        assert!(gen.probability(spike) > gen.probability(spike - 1));
    }
}
