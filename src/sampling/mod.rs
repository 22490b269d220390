pub mod gaussian;
pub mod uniform;

pub use gaussian::sample_gaussian_coeffs;
pub use uniform::{sample_sparse_ternary, sample_uniform_residues, sample_zero_one};
