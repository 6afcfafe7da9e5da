// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability traits, one per thing a peer library can do for the host.
//
// Return codes from the peers are passed through untouched; the host decides
// what they mean.

use std::ffi::{CStr, c_char, c_int};
use std::path::Path;

use phonetop_core::error::Result;
use phonetop_core::types::{ScreenSize, TouchEvent};

/// Frame callback handed to the Go bridge: `(pixels, width, height, stride)`.
pub type RenderCallback = unsafe extern "C" fn(*mut u8, c_int, c_int, c_int);

/// Event callback handed to the Go bridge: one NUL-terminated JSON string.
pub type EventCallback = unsafe extern "C" fn(*const c_char);

/// Go bridge lifecycle: initialisation and the blocking server loops.
pub trait NativeBridge: Send + Sync {
    /// `TsyneInit(headless)`.
    fn init(&self, headless: i32) -> i32;

    /// Serve msgpack over a Unix socket. Blocks for the life of the server.
    ///
    /// Uses the directory-aware export when `socket_dir` is given and the
    /// peer provides it.
    fn serve_msgpack(&self, test_mode: i32, socket_dir: Option<&CStr>) -> i32;

    /// Serve gRPC. Blocks for the life of the server.
    fn serve_grpc(&self, test_mode: i32) -> i32;

    /// Whether the embedded (surface rendering) mode is exported.
    fn supports_embedded(&self) -> bool;

    /// Run the embedded driver at `size`. Blocks.
    fn serve_embedded(&self, size: ScreenSize, socket_dir: Option<&CStr>) -> Result<i32>;
}

/// Rendering surface and input plumbing for embedded mode.
///
/// Every method is a no-op returning `false` when the export is missing.
pub trait NativeSurface: Send + Sync {
    fn install_render_callback(&self, callback: RenderCallback) -> bool;

    fn set_screen_size(&self, size: ScreenSize) -> bool;

    fn send_touch(&self, event: TouchEvent) -> bool;
}

/// Event delivery out of the Go bridge, pushed or polled.
pub trait NativeEvents: Send + Sync {
    /// Install (or with `None`, clear) the push callback.
    fn install_event_callback(&self, callback: Option<EventCallback>) -> bool;

    /// Pop one queued event JSON, if polling is supported and one is waiting.
    fn next_event(&self) -> Option<String>;

    /// Number of events waiting to be polled, if the peer reports it.
    fn queue_len(&self) -> Option<usize>;

    /// Send one request message and return the peer's JSON response.
    ///
    /// `None` when the request/response exports are missing or the peer
    /// returned nothing.
    fn send_message(&self, message: &CStr) -> Option<String>;

    /// Stop the bridge application.
    fn shutdown(&self) -> bool;
}

/// A script runtime (Node.js) that runs one program to completion.
pub trait NativeScriptHost: Send + Sync {
    /// Run `script`. Blocks until the runtime exits and returns its exit code.
    fn run_script(&self, script: &Path) -> Result<i32>;
}
