// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Value types shared between the adapter and the JNI surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a positional input event forwarded to the Go bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TouchPhase {
    Down,
    Move,
    Up,
}

impl TouchPhase {
    /// Exported symbol in the Go bridge that receives this phase.
    pub fn symbol(self) -> &'static str {
        match self {
            TouchPhase::Down => "SendAndroidTouchDown",
            TouchPhase::Move => "SendAndroidTouchMove",
            TouchPhase::Up => "SendAndroidTouchUp",
        }
    }
}

/// A single pointer event in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchEvent {
    pub phase: TouchPhase,
    pub x: f32,
    pub y: f32,
    pub pointer_id: i32,
}

/// Render surface geometry in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: f32,
    pub height: f32,
}

impl std::fmt::Display for ScreenSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}x{:.0}", self.width, self.height)
    }
}

/// Layout of an RGBA frame handed over by the render callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    pub width: i32,
    pub height: i32,
    /// Bytes per row, including padding.
    pub stride: i32,
}

impl FrameLayout {
    /// Size of the pixel buffer (`height * stride`), or `None` for a
    /// negative or overflowing layout.
    pub fn byte_len(&self) -> Option<usize> {
        let height = usize::try_from(self.height).ok()?;
        let stride = usize::try_from(self.stride).ok()?;
        height.checked_mul(stride)
    }
}

/// How a background launch came to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    /// Returned right after spawning, without waiting.
    Spawned,
    /// The fixed settle delay elapsed; nothing is known about the worker.
    Settled,
    /// The rendezvous socket appeared before the delay ran out.
    SocketBound,
    /// The socket was still missing when the delay ran out.
    TimedOut,
}

/// Acknowledgement returned after a background worker has been spawned.
///
/// Says nothing about the worker's eventual outcome, which is only logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchReceipt {
    pub worker: String,
    pub launched_at: DateTime<Utc>,
    pub readiness: Readiness,
}
