// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Phonetop native bridge adapter.
//!
//! Resolves entry points in peer libraries that the Android host has already
//! loaded (the Go-compiled Tsyne bridge and the embedded Node.js runtime),
//! caches them for the life of the process, and exposes each peer through a
//! typed capability trait. Blocking entry points run on dedicated worker
//! threads; callbacks from peer threads reach Java through a re-entrant
//! thread attachment.
//!
//! The JNI surface lives in `phonetop-jni`; this crate has no globals.

pub mod attach;
pub mod callback;
pub mod context;
pub mod ffi;
pub mod launcher;
pub mod node;
pub mod peer;
pub mod traits;
pub mod tsyne;

pub use context::BridgeContext;
