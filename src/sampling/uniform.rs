use rand::Rng;

/// `n` uniform residues in [0, modulus), by rejection on a power-of-two mask.
pub fn sample_uniform_residues<R: Rng>(n: usize, modulus: u64, rng: &mut R) -> Vec<u64> {
    let mask = if modulus.is_power_of_two() {
        modulus - 1
    } else {
        (1u64 << (64 - modulus.leading_zeros())) - 1
    };
    (0..n)
        .map(|_| loop {
            let val = rng.random::<u64>() & mask;
            if val < modulus {
                break val;
            }
        })
        .collect()
}

/// Coefficients in {-1, 0, 1} with Pr[0] = 1/2 and Pr[±1] = 1/4 each.
pub fn sample_zero_one<R: Rng>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n)
        .map(|_| match rng.random::<u8>() & 0x03 {
            0 => -1,
            1 => 1,
            _ => 0,
        })
        .collect()
}

/// Ternary vector with exactly `weight` nonzero entries at uniform positions,
/// each ±1 with equal probability. `weight` is clamped to `n`.
pub fn sample_sparse_ternary<R: Rng>(n: usize, weight: usize, rng: &mut R) -> Vec<i64> {
    let weight = weight.min(n);
    let mut coeffs = vec![0i64; n];
    let mut placed = 0;
    while placed < weight {
        let pos = rng.random_range(0..n);
        if coeffs[pos] == 0 {
            coeffs[pos] = if rng.random::<bool>() { 1 } else { -1 };
            placed += 1;
        }
    }
    coeffs
}
