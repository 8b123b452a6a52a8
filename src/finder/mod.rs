//! Email finder: domain extraction, candidate patterns, verification.

mod domain;
mod engine;
mod patterns;
mod verifier;

pub use domain::*;
pub use engine::*;
pub use patterns::*;
pub use verifier::*;
