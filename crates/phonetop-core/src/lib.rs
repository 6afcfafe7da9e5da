// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Phonetop: core types, configuration and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod socket;
pub mod types;

pub use config::BridgeConfig;
pub use error::PhonetopError;
pub use types::*;
