// SPDX-License-Identifier: Apache-2.0

//! SQL Synthesizer (C7) — spec §4.7.

pub mod dialect;
pub mod expr;
pub mod synth;

pub use dialect::Dialect;
pub use synth::{synthesize, SynthesisOptions, TimeWindowTarget};
