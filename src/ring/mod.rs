//! Ring arithmetic over Z[X]/(X^n+1): scalar helpers, single-prime NTT
//! residues, and the double-CRT polynomial built from them.

pub mod index_set;
pub mod modular;
pub mod ntt;
pub mod poly;
pub mod rns;

pub use index_set::IndexSet;
pub use ntt::NttPoly;
pub use poly::{CoeffPoly, IntPoly};
pub use rns::RnsPoly;
