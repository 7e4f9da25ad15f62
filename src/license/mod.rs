//! License identifiers and reference texts.
//!
//! - [`spdx`]: normalizes raw license strings to SPDX identifiers and splits
//!   SPDX expressions into their component ids.
//! - [`texts`]: read-only lookup from SPDX id to a bundled full license text.

pub mod spdx;
pub mod texts;
