//! Property values and their wire/script representations.

#![allow(missing_docs)]

mod foreign;
mod types;
mod wire;

pub use foreign::*;
pub use types::*;
pub use wire::*;
