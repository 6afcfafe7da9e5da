// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Marshalling between JNI values and the adapter's Rust types.

use std::path::PathBuf;

use jni::JNIEnv;
use jni::objects::JString;
use jni::sys::{jint, jstring};

use phonetop_core::error::{PhonetopError, Result};
use phonetop_core::types::LaunchReceipt;

/// Read a nullable `java.lang.String` argument.
pub fn optional_string(env: &mut JNIEnv, value: &JString) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    let text: String = env
        .get_string(value)
        .map_err(|e| PhonetopError::Unavailable(format!("unreadable string argument: {e}")))?
        .into();
    Ok(Some(text))
}

/// Read a nullable path argument. Empty strings count as unset.
pub fn optional_path(env: &mut JNIEnv, value: &JString) -> Result<Option<PathBuf>> {
    Ok(optional_string(env, value)?
        .filter(|s| !s.is_empty())
        .map(PathBuf::from))
}

/// Read a path argument that must be present.
pub fn required_path(env: &mut JNIEnv, value: &JString, what: &str) -> Result<PathBuf> {
    optional_path(env, value)?.ok_or_else(|| PhonetopError::Unavailable(format!("{what} is null")))
}

/// Hand `text` back to Java, or `null` if the string cannot be created.
pub fn to_jstring(env: &mut JNIEnv, text: &str) -> jstring {
    match env.new_string(text) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            tracing::error!(error = %e, "failed to create Java string");
            std::ptr::null_mut()
        }
    }
}

/// Collapse a status result into the code Java sees.
pub fn status_code(op: &'static str, result: Result<i32>) -> jint {
    match result {
        Ok(code) => code,
        Err(e) => {
            let code = e.sentinel();
            tracing::error!(op, code, error = %e, "bridge call failed");
            code
        }
    }
}

/// A successful launch is reported to Java as `0`.
///
/// `spawn_failed` is the code this export has always returned when the OS
/// refuses a worker thread; every other error keeps its sentinel.
pub fn launch_code(op: &'static str, result: Result<LaunchReceipt>, spawn_failed: jint) -> jint {
    let result = match result {
        Err(PhonetopError::Launch { name, detail }) => {
            tracing::error!(op, code = spawn_failed, worker = %name, detail = %detail, "worker thread not created");
            return spawn_failed;
        }
        other => other,
    };
    status_code(
        op,
        result.map(|receipt| {
            tracing::info!(op, worker = %receipt.worker, readiness = ?receipt.readiness, "launch acknowledged");
            0
        }),
    )
}
