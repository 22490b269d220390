use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};

/// Barrett reduction: compute a mod m using precomputed Barrett constant.
///
/// Barrett constant k = floor(2^64 / m). For moduli ≤ 2^32 the single-word
/// trick is exact for inputs a < m^2; wider moduli fall back to u128 division.
#[inline(always)]
pub fn barrett_reduce(a: u128, m: u64, barrett_k: u64) -> u64 {
    if m > (1u64 << 32) {
        (a % m as u128) as u64
    } else {
        let q_hat = ((a * barrett_k as u128) >> 64) as u64;
        let r = (a as u64).wrapping_sub(q_hat.wrapping_mul(m));
        if r >= m { r.wrapping_sub(m) } else { r }
    }
}

/// Compute Barrett constant for modulus m: floor(2^64 / m)
#[inline]
pub fn barrett_constant(m: u64) -> u64 {
    debug_assert!(m > 1, "modulus must be > 1");
    ((1u128 << 64) / m as u128) as u64
}

/// Modular addition: (a + b) mod m, assumes a, b < m
#[inline(always)]
pub fn mod_add(a: u64, b: u64, m: u64) -> u64 {
    let sum = a as u128 + b as u128;
    let r = sum as u64;
    if sum >= m as u128 { r.wrapping_sub(m) } else { r }
}

/// Modular subtraction: (a - b) mod m, assumes a, b < m
#[inline(always)]
pub fn mod_sub(a: u64, b: u64, m: u64) -> u64 {
    if a >= b { a - b } else { m - b + a }
}

/// Modular negation: (-a) mod m, assumes a < m
#[inline(always)]
pub fn mod_neg(a: u64, m: u64) -> u64 {
    if a == 0 { 0 } else { m - a }
}

/// Modular multiplication: (a * b) mod m using Barrett reduction
#[inline(always)]
pub fn mod_mul(a: u64, b: u64, m: u64, barrett_k: u64) -> u64 {
    barrett_reduce(a as u128 * b as u128, m, barrett_k)
}

/// Modular exponentiation: a^exp mod m
pub fn mod_pow(mut base: u64, mut exp: u64, m: u64) -> u64 {
    if m == 1 {
        return 0;
    }
    let bk = barrett_constant(m);
    let mut result = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mod_mul(result, base, m, bk);
        }
        exp >>= 1;
        base = mod_mul(base, base, m, bk);
    }
    result
}

/// a^{-1} mod m via the extended Euclidean algorithm.
pub fn mod_inv(a: u64, m: u64) -> Option<u64> {
    let (mut old_r, mut r) = (a as i128 % m as i128, m as i128);
    let (mut old_s, mut s) = (1i128, 0i128);

    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }

    if old_r != 1 {
        return None;
    }
    Some(old_s.rem_euclid(m as i128) as u64)
}

/// Multiplicative order of `a` modulo `m`, or `None` when gcd(a, m) != 1.
pub fn mult_order(a: u64, m: u64) -> Option<usize> {
    if m == 1 {
        return Some(1);
    }
    if a.gcd(&m) != 1 {
        return None;
    }
    let mut acc = a % m;
    let mut order = 1usize;
    while acc != 1 {
        acc = ((acc as u128 * a as u128) % m as u128) as u64;
        order += 1;
    }
    Some(order)
}

/// Deterministic Miller-Rabin for 64-bit integers.
pub fn is_prime(n: u64) -> bool {
    const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }
    let mut d = n - 1;
    let mut s = 0u32;
    while d & 1 == 0 {
        d >>= 1;
        s += 1;
    }
    let mul = |a: u64, b: u64| ((a as u128 * b as u128) % n as u128) as u64;
    'witness: for &a in &WITNESSES {
        let mut x = 1u64;
        let (mut base, mut e) = (a % n, d);
        while e > 0 {
            if e & 1 == 1 {
                x = mul(x, base);
            }
            base = mul(base, base);
            e >>= 1;
        }
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul(x, x);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Largest prime q < 2^bits with q ≡ 1 (mod 2n) that is not in `taken`.
pub fn next_ntt_prime(bits: u32, ring_degree: usize, taken: &[u64]) -> Option<u64> {
    let step = 2 * ring_degree as u64;
    if bits >= 63 || (1u64 << bits) <= step {
        return None;
    }
    let mut candidate = ((1u64 << bits) - 1) / step * step + 1;
    while candidate > step {
        if !taken.contains(&candidate) && is_prime(candidate) {
            return Some(candidate);
        }
        candidate -= step;
    }
    None
}

/// Representative of `x mod m` in (-m/2, m/2].
pub fn centered_mod(x: &BigInt, m: &BigInt) -> BigInt {
    let mut r = x.mod_floor(m);
    let doubled: BigInt = &r << 1;
    if &doubled > m {
        r -= m;
    }
    r
}

/// Reduce a signed integer into [0, q).
pub fn bigint_mod_u64(x: &BigInt, q: u64) -> u64 {
    let qb = BigInt::from(q);
    let r = x.mod_floor(&qb);
    let (_, digits) = r.to_u64_digits();
    digits.first().copied().unwrap_or(0)
}

/// Reduce an unsigned integer into [0, q).
pub fn biguint_mod_u64(x: &BigUint, q: u64) -> u64 {
    let r = x % q;
    r.to_u64_digits().first().copied().unwrap_or(0)
}

/// Inverse of `a` modulo `m` for arbitrary-precision operands.
pub fn mod_inverse_big(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    if m.is_one() {
        return Some(BigUint::zero());
    }
    let m_int = BigInt::from_biguint(Sign::Plus, m.clone());
    let a_int = BigInt::from_biguint(Sign::Plus, a % m);
    let ext = a_int.extended_gcd(&m_int);
    if !ext.gcd.is_one() {
        return None;
    }
    ext.x.mod_floor(&m_int).to_biguint()
}
