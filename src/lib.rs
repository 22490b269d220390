//! # levelled-bgv: ciphertext algebra for levelled BGV
//!
//! Ciphertexts are lists of double-CRT polynomials, each tagged with the
//! secret-key monomial it pairs with. The crate tracks a heuristic noise
//! variance per ciphertext and uses it to decide when and how far to
//! modulus-switch, so that additions, multiplications, key switching and
//! automorphisms can be chained until the modulus runs out.
//!
//! ## Quick Start
//!
//! ```no_run
//! use levelled_bgv::prelude::*;
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha20Rng;
//!
//! let ctx = levelled_bgv::params::presets::compact_bgv(7).unwrap();
//! let mut rng = ChaCha20Rng::seed_from_u64(1);
//! let mut sk = SecretKey::generate_with_rng(ctx.clone(), 8, &mut rng).unwrap();
//! sk.gen_relin_matrix(0, &mut rng).unwrap();
//! let pk = sk.public_key();
//!
//! let a = pk.encrypt(&IntPoly::constant(ctx.ring_degree(), 3), None, &mut rng).unwrap();
//! let b = pk.encrypt(&IntPoly::constant(ctx.ring_degree(), 5), None, &mut rng).unwrap();
//!
//! let mut stream = RandomStream::from_seed(2);
//! let mut c = a.clone();
//! c.multiply_by(&b, &mut stream).unwrap();
//! assert_eq!(sk.decrypt(&c).unwrap(), IntPoly::constant(ctx.ring_degree(), 1));
//! ```

pub mod ctxt;
pub mod encoding;
pub mod error;
pub mod keys;
pub mod noise;
pub mod params;
pub mod random;
pub mod ring;
pub mod sampling;
pub(crate) mod text;

/// Convenient re-exports for common types and functions.
pub mod prelude {
    pub use crate::ctxt::{
        incremental_product, inner_product, inner_product_const, inner_product_const_rns, Ciphertext,
        CiphertextPart, SecretKeyHandle,
    };
    pub use crate::encoding::{decode_coeffs, decode_scalar, encode_coeffs, encode_scalar};
    pub use crate::error::{HeError, Result};
    pub use crate::keys::{KeySwitchMatrix, PublicKey, SecretKey};
    pub use crate::noise::XDouble;
    pub use crate::params::{RingContext, RingContextBuilder};
    pub use crate::random::RandomStream;
    pub use crate::ring::{IndexSet, IntPoly, RnsPoly};
}
