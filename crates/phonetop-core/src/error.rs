// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Phonetop.

use thiserror::Error;

/// Top-level error type for all bridge adapter operations.
#[derive(Debug, Error)]
pub enum PhonetopError {
    // -- Peer resolution --
    #[error("peer library {library} is not loaded in this process: {detail}")]
    Link { library: String, detail: String },

    #[error("entry point {symbol} not found in {library}")]
    Symbol { library: String, symbol: String },

    /// A required entry point failed to bind earlier; the peer stays unusable.
    #[error("peer {0} is unavailable after a failed initialisation")]
    PeerUnusable(String),

    /// An optional entry point is absent, or an argument could not be marshalled.
    #[error("operation unavailable: {0}")]
    Unavailable(String),

    // -- Host callbacks --
    #[error("callback target is missing {method}{signature}: {detail}")]
    Binding {
        method: String,
        signature: String,
        detail: String,
    },

    #[error("could not attach thread to the host VM: {0}")]
    Attach(String),

    #[error("host dispatch failed: {0}")]
    Dispatch(String),

    // -- Workers --
    #[error("failed to spawn worker {name}: {detail}")]
    Launch { name: String, detail: String },

    #[error("worker {0} is already running")]
    WorkerBusy(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PhonetopError {
    /// Negative code handed back across the JNI boundary in place of this error.
    ///
    /// The host interprets these; the adapter never retries on its own.
    pub fn sentinel(&self) -> i32 {
        match self {
            PhonetopError::Link { .. }
            | PhonetopError::Symbol { .. }
            | PhonetopError::PeerUnusable(_) => -1,
            PhonetopError::Unavailable(_) => -2,
            PhonetopError::Binding { .. } => -3,
            PhonetopError::Launch { .. } => -4,
            PhonetopError::Attach(_) => -5,
            PhonetopError::WorkerBusy(_) => -6,
            PhonetopError::Io(_) | PhonetopError::Serialization(_) => -7,
            PhonetopError::Dispatch(_) => -8,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PhonetopError>;
