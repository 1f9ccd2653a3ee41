//! Binary MIX word primitives.
//!
//! This module provides the value types every other part of the machine
//! is built on:
//! - [`Sign`] - the sign position of a word
//! - [`Word`] - a sign plus five six-bit bytes
//! - [`FieldSpec`] with [`extract`] and [`insert`] - partial-word access

mod sign;
mod word;
pub mod field;
pub mod arith;

pub use sign::Sign;
pub use word::{Word, WordError};
pub use field::{FieldSpec, FieldError, extract, insert};
