//! Shared foundational helpers used across the loom elaboration core.
//!
//! This crate provides bit-width arithmetic for two's-complement values and
//! content fingerprints for structural comparison of IR trees.

#![warn(missing_docs)]

pub mod bits;
pub mod hash;

pub use bits::{bits_for, mask, sign_extend, truncate, MAX_WIDTH};
pub use hash::{ContentHash, FingerprintError};
