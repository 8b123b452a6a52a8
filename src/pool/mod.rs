//! Pool module - concurrent row processing.

mod worker;

pub use worker::*;
