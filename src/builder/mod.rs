//! Name-based construction of validated transition matrices.
//!
//! The builder is used once per trial template: [`StateMatrix`] grows
//! mutable rows while states are added by name, then the finalizers freeze
//! and validate the arrays the runtime consumes.

pub mod error;
pub mod matrix;

pub use error::BuildError;
pub use matrix::{MatrixAnalysis, StateMatrix, StateSpec};
