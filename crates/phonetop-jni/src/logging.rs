// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Diagnostic stream for the adapter. Side channel only: nothing here feeds
// back into return codes.
//
// App processes on Android have no usable stdout, so there the stream goes
// to logcat. Host builds (tests, desktop tooling) keep the fmt subscriber.

use std::sync::Once;

/// Logcat tag for everything the adapter logs.
pub const LOG_TAG: &str = "TsyneJNI";

/// Level used when `RUST_LOG` is unset or unparsable.
const DEFAULT_LEVEL: &str = "info";

static INIT: Once = Once::new();

/// Install the diagnostic sink once. `RUST_LOG` overrides the `info` default.
pub fn init() {
    INIT.call_once(install);
}

#[cfg(target_os = "android")]
fn install() {
    // With no tracing subscriber installed, tracing's `log` feature turns
    // every event into a `log` record, which android_logger writes to logcat.
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| v.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(level)
            .with_tag(LOG_TAG),
    );
    tracing::info!(tag = LOG_TAG, default = DEFAULT_LEVEL, "logcat logging installed");
}

#[cfg(not(target_os = "android"))]
fn install() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LEVEL)),
        )
        .with_target(false)
        .with_thread_names(true)
        .try_init();
    if installed.is_err() {
        tracing::debug!("a global subscriber was already installed by the host");
    }
}
