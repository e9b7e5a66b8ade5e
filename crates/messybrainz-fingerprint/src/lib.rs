// SPDX-License-Identifier: GPL-3.0-or-later

//! Normalization and content fingerprinting of submitted listens.
//!
//! This crate provides functionality for:
//! - Canonicalizing loosely formatted artist/title/release metadata
//! - Deriving a 256-bit dedup fingerprint from the canonical form

pub mod fingerprinter;
pub mod normalizer;

pub use fingerprinter::{fingerprint, ENCODING_VERSION};
pub use normalizer::{Normalizer, NormalizerOptions};
