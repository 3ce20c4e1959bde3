//! # Pipeline Module
//!
//! Processing stages and the name-keyed factory registry used to assemble
//! an engine from configuration.

mod stage;

pub use stage::*;
