use rand::Rng;

/// Sample `n` integers from the discrete Gaussian over Z with standard
/// deviation σ, centered at 0, truncated to ±⌈6σ⌉.
///
/// Uses a constant-time CDT (cumulative distribution table) scan. The table is
/// built once per call and shared by all `n` draws.
pub fn sample_gaussian_coeffs<R: Rng>(n: usize, sigma: f64, rng: &mut R) -> Vec<i64> {
    let table = CdtTable::new(sigma);
    (0..n).map(|_| table.sample(rng)).collect()
}

struct CdtTable {
    tail: i64,
    cdf: Vec<f64>,
}

impl CdtTable {
    fn new(sigma: f64) -> Self {
        let tail = (6.0 * sigma).ceil() as i64;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut cumulative = 0.0f64;
        let cdf = (-tail..=tail)
            .map(|x| {
                cumulative += (-((x * x) as f64) / two_sigma_sq).exp();
                cumulative
            })
            .collect();
        Self { tail, cdf }
    }

    /// Branchless scan: every CDF entry is visited and a mask select keeps the
    /// lowest index i with u < cdf[i].
    fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        let total = self.cdf.last().copied().unwrap_or(1.0);
        let u: f64 = rng.random::<f64>() * total;
        let mut result = self.tail;
        for (i, &c) in self.cdf.iter().enumerate().rev() {
            let mask = ((u < c) as i64).wrapping_neg();
            let candidate = -self.tail + i as i64;
            result = (candidate & mask) | (result & !mask);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_gaussian_distribution() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let sigma = 3.2;
        let n = 10000;
        let samples = sample_gaussian_coeffs(n, sigma, &mut rng);

        let mean: f64 = samples.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.5, "mean = {mean}");

        let var: f64 = samples.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n as f64;
        let expected_var = sigma * sigma;
        assert!((var - expected_var).abs() < 2.0, "var = {var}, expected ≈ {expected_var}");

        let tail = (6.0 * sigma).ceil() as i64;
        assert!(samples.iter().all(|s| s.abs() <= tail));
    }

    #[test]
    fn test_seeded_streams_agree() {
        let a = sample_gaussian_coeffs(64, 3.2, &mut ChaCha20Rng::seed_from_u64(7));
        let b = sample_gaussian_coeffs(64, 3.2, &mut ChaCha20Rng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}
