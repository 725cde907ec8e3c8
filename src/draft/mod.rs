//! Draft generation — candidate replies awaiting approval.

pub mod generator;

pub use generator::{Draft, DraftGenerator, GenerateOptions};
