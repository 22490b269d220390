use super::Ciphertext;
use crate::error::Result;
use crate::random::RandomStream;
use crate::ring::{IntPoly, RnsPoly};

/// Replace `v` by its prefix products: `v[i] <- v[0]·v[1]···v[i]`.
///
/// Recursive halving keeps the multiplicative depth at ⌈log2 n⌉.
pub fn incremental_product(v: &mut [Ciphertext<'_>], stream: &mut RandomStream) -> Result<()> {
    let n = v.len();
    if n <= 1 {
        return Ok(());
    }
    let mut n1 = 1;
    while 2 * n1 < n {
        n1 <<= 1;
    }
    let (left, right) = v.split_at_mut(n1);
    incremental_product(left, stream)?;
    incremental_product(right, stream)?;
    let pivot = &left[n1 - 1];
    for c in right.iter_mut() {
        c.multiply_by(pivot, stream)?;
    }
    Ok(())
}

/// `result <- Σ v1[i]·v2[i]`, relinearized once at the end.
///
/// Extra entries of the longer slice are ignored; empty input clears `result`.
pub fn inner_product<'a>(
    result: &mut Ciphertext<'a>,
    v1: &[Ciphertext<'a>],
    v2: &[Ciphertext<'a>],
    stream: &mut RandomStream,
) -> Result<()> {
    let mut pairs = v1.iter().zip(v2);
    let Some((a, b)) = pairs.next() else {
        result.clear();
        return Ok(());
    };
    let mut acc = a.clone();
    acc.mul_ctxt(b)?;
    for (a, b) in pairs {
        let mut term = a.clone();
        term.mul_ctxt(b)?;
        acc.add_ctxt(&term, false)?;
    }
    acc.relinearize(None, stream)?;
    *result = acc;
    Ok(())
}

/// `result <- Σ v[i]·consts[i]` for plaintext polynomials.
pub fn inner_product_const<'a>(
    result: &mut Ciphertext<'a>,
    v: &[Ciphertext<'a>],
    consts: &[IntPoly],
) -> Result<()> {
    accumulate(result, v, consts, |c, k| c.mult_by_constant_poly(k, None))
}

/// `result <- Σ v[i]·consts[i]` for constants already in RNS form.
pub fn inner_product_const_rns<'a>(
    result: &mut Ciphertext<'a>,
    v: &[Ciphertext<'a>],
    consts: &[RnsPoly],
) -> Result<()> {
    accumulate(result, v, consts, |c, k| c.mult_by_constant_rns(k, None))
}

fn accumulate<'a, K>(
    result: &mut Ciphertext<'a>,
    v: &[Ciphertext<'a>],
    consts: &[K],
    mut mul: impl FnMut(&mut Ciphertext<'a>, &K) -> Result<()>,
) -> Result<()> {
    let mut pairs = v.iter().zip(consts);
    let Some((c, k)) = pairs.next() else {
        result.clear();
        return Ok(());
    };
    let mut acc = c.clone();
    mul(&mut acc, k)?;
    for (c, k) in pairs {
        let mut term = c.clone();
        mul(&mut term, k)?;
        acc.add_ctxt(&term, false)?;
    }
    *result = acc;
    Ok(())
}
