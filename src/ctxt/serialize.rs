//! Text form of ciphertexts.
//!
//! ```text
//! [t noise {primes} nparts
//! [poly
//! [power_of_s power_of_x key_id]]
//! ...
//! ]
//! ```

use std::fmt;

use num_bigint::BigUint;

use super::{prime_set_is_valid, Ciphertext, CiphertextPart, SecretKeyHandle};
use crate::error::{HeError, Result};
use crate::keys::PublicKey;
use crate::noise::XDouble;
use crate::params::RingContext;
use crate::ring::RnsPoly;
use crate::text::Tokens;

impl fmt::Display for CiphertextPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}\n{}]", self.poly, self.handle)
    }
}

impl fmt::Display for Ciphertext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[{} {} {} {}",
            self.ptxt_space,
            self.noise_var,
            self.prime_set,
            self.parts.len()
        )?;
        for part in &self.parts {
            writeln!(f, "{part}")?;
        }
        write!(f, "]")
    }
}

fn read_handle(tokens: &mut Tokens<'_>) -> Result<SecretKeyHandle> {
    tokens.expect("[")?;
    let power_of_s = tokens.parse()?;
    let power_of_x = tokens.parse()?;
    let key_id = tokens.parse()?;
    tokens.expect("]")?;
    Ok(SecretKeyHandle::new(power_of_s, power_of_x, key_id))
}

fn read_part(tokens: &mut Tokens<'_>, ctx: &RingContext) -> Result<CiphertextPart> {
    tokens.expect("[")?;
    let poly = RnsPoly::read_tokens(tokens, ctx)?;
    let handle = read_handle(tokens)?;
    tokens.expect("]")?;
    Ok(CiphertextPart::new(poly, handle))
}

impl<'a> Ciphertext<'a> {
    /// Parse the `Display` form back into a ciphertext bound to `public_key`.
    ///
    /// The result gets a fresh value id.
    pub fn read_from(public_key: &'a PublicKey, text: &str) -> Result<Self> {
        let ctx = public_key.context();
        let mut tokens = Tokens::new(text);
        tokens.expect("[")?;
        let ptxt_space: BigUint = tokens.parse()?;
        let noise_var: XDouble = tokens.parse()?;
        let prime_set = tokens.index_set()?;
        let count: usize = tokens.parse()?;

        if prime_set.last().is_some_and(|i| i >= ctx.num_primes()) {
            return Err(HeError::Parse(format!("prime set {prime_set} exceeds the chain")));
        }
        if !prime_set_is_valid(ctx, &prime_set) {
            return Err(HeError::InvariantViolation(format!(
                "prime set {prime_set} is not a valid ciphertext set"
            )));
        }

        let mut parts: Vec<CiphertextPart> = Vec::with_capacity(count.min(prime_set.len() + 1));
        for _ in 0..count {
            let part = read_part(&mut tokens, ctx)?;
            let part_set = part.index_set();
            if part_set != prime_set {
                return Err(HeError::InvariantViolation(format!(
                    "part over {part_set} in a ciphertext over {prime_set}"
                )));
            }
            if parts.iter().any(|p| p.handle == part.handle) {
                return Err(HeError::InvariantViolation(format!("duplicate handle {}", part.handle)));
            }
            parts.push(part);
        }
        tokens.expect("]")?;
        if !tokens.is_exhausted() {
            return Err(HeError::Parse("trailing input after ciphertext".into()));
        }

        Ok(Ciphertext::from_parts(public_key, parts, prime_set, ptxt_space, noise_var))
    }
}
