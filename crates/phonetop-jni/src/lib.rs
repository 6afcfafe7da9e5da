// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JNI surface for `com.tsyne.phonetop.MainActivity`.
//
// The activity loads `libtsyne-bridge.so` and `libnode.so` first, then this
// library as `System.loadLibrary("phonetop_jni")`. Every native method below
// maps onto one `BridgeContext` operation; failures come back to Java as
// negative codes (see `PhonetopError::sentinel`), never as exceptions.

mod convert;
mod logging;

use std::ffi::{CStr, c_char, c_int, c_void};
use std::sync::OnceLock;

use jni::objects::{JClass, JObject, JString};
use jni::sys::{JNI_VERSION_1_6, jfloat, jint, jstring};
use jni::{JNIEnv, JavaVM};

use phonetop_bridge::BridgeContext;
use phonetop_bridge::callback::{CallbackTarget, EVENT_METHOD, FRAME_METHOD};
use phonetop_core::config::BridgeConfig;
use phonetop_core::error::{PhonetopError, Result};
use phonetop_core::types::{FrameLayout, ScreenSize, TouchEvent, TouchPhase};

use convert::{
    launch_code, optional_path, optional_string, required_path, status_code, to_jstring,
};

// Re-exported so the unmangled symbol ends up in libphonetop_jni.so.
pub use phonetop_bridge::ffi::callEventCallback;

/// Name the activity passes to `System.loadLibrary`.
pub const LIBRARY_NAME: &str = "phonetop_jni";

// Codes the launch exports return when no worker thread could be created.
const BRIDGE_SPAWN_FAILED: jint = -2;
const NODE_SPAWN_FAILED: jint = -3;
const EMBEDDED_SPAWN_FAILED: jint = -4;

static CONTEXT: OnceLock<BridgeContext> = OnceLock::new();

/// The process-wide context, created from the environment on first use.
fn context() -> &'static BridgeContext {
    CONTEXT.get_or_init(|| BridgeContext::new(BridgeConfig::from_env()))
}

// ---------------------------------------------------------------------------
// Library lifecycle
// ---------------------------------------------------------------------------

/// Capture the `JavaVM` so peer threads can call back into Java.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn JNI_OnLoad(vm: JavaVM, _reserved: *mut c_void) -> jint {
    logging::init();
    if context().callbacks().set_host(vm) {
        tracing::info!(library = LIBRARY_NAME, "JNI_OnLoad: JavaVM captured");
    } else {
        tracing::warn!("JNI_OnLoad: JavaVM already captured, keeping the first one");
    }
    JNI_VERSION_1_6
}

// ---------------------------------------------------------------------------
// Trampolines handed to the Go bridge
// ---------------------------------------------------------------------------

/// Render callback: forwards an RGBA frame to the registered `onFrame` target.
extern "C" fn on_native_frame(pixels: *mut u8, width: c_int, height: c_int, stride: c_int) {
    if pixels.is_null() {
        return;
    }
    let layout = FrameLayout {
        width,
        height,
        stride,
    };
    // SAFETY: the Go render loop keeps `height * stride` bytes at `pixels`
    // alive until this callback returns.
    if let Err(e) = unsafe { context().callbacks().deliver_frame(pixels, layout) } {
        tracing::warn!(error = %e, "frame delivery failed");
    }
}

/// Event callback: forwards one JSON event to the registered `onEvent` target.
extern "C" fn on_native_event(event_json: *const c_char) {
    if event_json.is_null() {
        return;
    }
    // SAFETY: the bridge passes a C string it frees only after we return.
    let json = unsafe { CStr::from_ptr(event_json) }.to_string_lossy();
    if let Err(e) = context().callbacks().deliver_event(&json) {
        tracing::warn!(error = %e, "event delivery failed");
    }
}

// ---------------------------------------------------------------------------
// Pass-through calls
// ---------------------------------------------------------------------------

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_TsyneInit(
    _env: JNIEnv,
    _class: JClass,
    headless: jint,
) -> jint {
    status_code("TsyneInit", context().init(headless))
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_StartBridgeMsgpackUDS(
    _env: JNIEnv,
    _class: JClass,
    test_mode: jint,
) -> jint {
    status_code("StartBridgeMsgpackUDS", context().serve_msgpack(test_mode))
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_StartBridgeGrpc(
    _env: JNIEnv,
    _class: JClass,
    test_mode: jint,
) -> jint {
    status_code("StartBridgeGrpc", context().serve_grpc(test_mode))
}

// ---------------------------------------------------------------------------
// Background launches
// ---------------------------------------------------------------------------

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_startBridgeInBackground(
    mut env: JNIEnv,
    _class: JClass,
    test_mode: jint,
    socket_dir: JString,
) -> jint {
    let result = optional_path(&mut env, &socket_dir)
        .and_then(|dir| context().start_bridge_in_background(test_mode, dir));
    launch_code("startBridgeInBackground", result, BRIDGE_SPAWN_FAILED)
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_startEmbeddedBridge(
    mut env: JNIEnv,
    _class: JClass,
    width: jfloat,
    height: jfloat,
    socket_dir: JString,
    render_target: JObject,
) -> jint {
    let result = (|| {
        let context = context();
        // Resolve first so a missing peer reports -1 before anything else.
        context.tsyne()?;
        let dir = optional_path(&mut env, &socket_dir)?;
        let target = if render_target.is_null() {
            None
        } else {
            Some(CallbackTarget::register(&mut env, &render_target, FRAME_METHOD)?)
        };
        context.start_embedded(ScreenSize { width, height }, dir, target, on_native_frame)
    })();
    launch_code("startEmbeddedBridge", result, EMBEDDED_SPAWN_FAILED)
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_startNode(
    mut env: JNIEnv,
    _class: JClass,
    script_path: JString,
) -> jint {
    let result = required_path(&mut env, &script_path, "script path")
        .and_then(|script| context().start_node(script));
    launch_code("startNode", result, NODE_SPAWN_FAILED)
}

// ---------------------------------------------------------------------------
// Socket rendezvous
// ---------------------------------------------------------------------------

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_getBridgeSocketPath(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let path = context().socket_path();
    tracing::info!(path = %path.display(), "socket path");
    to_jstring(&mut env, &path.to_string_lossy())
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_writeBridgeConfig(
    mut env: JNIEnv,
    _class: JClass,
    config_path: JString,
) -> jint {
    let result = required_path(&mut env, &config_path, "config path")
        .and_then(|path| context().write_node_config(&path))
        .map(|_| 0);
    status_code("writeBridgeConfig", result)
}

// ---------------------------------------------------------------------------
// Surface geometry and input
// ---------------------------------------------------------------------------

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_setScreenSize(
    _env: JNIEnv,
    _class: JClass,
    width: jfloat,
    height: jfloat,
) {
    context().set_screen_size(ScreenSize { width, height });
}

fn forward_touch(phase: TouchPhase, x: jfloat, y: jfloat, pointer_id: jint) {
    context().send_touch(TouchEvent {
        phase,
        x,
        y,
        pointer_id,
    });
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_sendTouchDown(
    _env: JNIEnv,
    _class: JClass,
    x: jfloat,
    y: jfloat,
    pointer_id: jint,
) {
    forward_touch(TouchPhase::Down, x, y, pointer_id);
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_sendTouchMove(
    _env: JNIEnv,
    _class: JClass,
    x: jfloat,
    y: jfloat,
    pointer_id: jint,
) {
    forward_touch(TouchPhase::Move, x, y, pointer_id);
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_sendTouchUp(
    _env: JNIEnv,
    _class: JClass,
    x: jfloat,
    y: jfloat,
    pointer_id: jint,
) {
    forward_touch(TouchPhase::Up, x, y, pointer_id);
}

// ---------------------------------------------------------------------------
// Events and shutdown
// ---------------------------------------------------------------------------

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_registerEventTarget(
    mut env: JNIEnv,
    _class: JClass,
    event_target: JObject,
) -> jint {
    let result: Result<i32> = (|| {
        let context = context();
        context.tsyne()?;
        let target = CallbackTarget::register(&mut env, &event_target, EVENT_METHOD)?;
        context.register_event_target(target, on_native_event)?;
        Ok(0)
    })();
    status_code("registerEventTarget", result)
}

/// Next queued event as JSON, or `null` when there is none (or no bridge).
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_pollEvent(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    match context().poll_event() {
        Ok(Some(event)) => to_jstring(&mut env, &event),
        Ok(None) => std::ptr::null_mut(),
        Err(e) => {
            tracing::debug!(error = %e, "pollEvent: bridge not available");
            std::ptr::null_mut()
        }
    }
}

/// Number of events waiting for `pollEvent`, or a negative code.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_getEventQueueLength(
    _env: JNIEnv,
    _class: JClass,
) -> jint {
    let result = context()
        .pending_events()
        .map(|len| jint::try_from(len).unwrap_or(jint::MAX));
    status_code("getEventQueueLength", result)
}

/// Send one JSON message to the bridge and return its JSON response, or
/// `null` if the bridge could not answer.
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_sendMessage(
    mut env: JNIEnv,
    _class: JClass,
    message: JString,
) -> jstring {
    let result = optional_string(&mut env, &message).and_then(|message| {
        let message = message.ok_or_else(|| PhonetopError::Unavailable("message is null".into()))?;
        context().send_message(&message)
    });
    match result {
        Ok(response) => to_jstring(&mut env, &response),
        Err(e) => {
            tracing::error!(code = e.sentinel(), error = %e, "sendMessage failed");
            std::ptr::null_mut()
        }
    }
}

#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_tsyne_phonetop_MainActivity_shutdownBridge(
    _env: JNIEnv,
    _class: JClass,
) {
    context().shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trampolines_ignore_null_pointers() {
        on_native_frame(std::ptr::null_mut(), 1, 1, 4);
        on_native_event(std::ptr::null());
    }

    #[test]
    fn frames_without_target_are_dropped() {
        let mut pixels = vec![0u8; 4 * 4 * 4];
        on_native_frame(pixels.as_mut_ptr(), 4, 4, 16);
        on_native_event(c"{\"type\":\"noop\"}".as_ptr());
    }

    #[test]
    fn load_name_matches_built_library() {
        // Cargo names the artifact lib<crate name>.so.
        assert_eq!(LIBRARY_NAME, env!("CARGO_CRATE_NAME"));
    }

    #[test]
    fn spawn_failure_codes_match_each_export() {
        assert_eq!(
            [BRIDGE_SPAWN_FAILED, NODE_SPAWN_FAILED, EMBEDDED_SPAWN_FAILED],
            [-2, -3, -4]
        );
    }

    #[test]
    fn socket_path_is_per_process() {
        let path = context().socket_path();
        let name = path.file_name().and_then(|n| n.to_str()).expect("file name");
        assert_eq!(name, format!("tsyne-{}.sock", std::process::id()));
    }
}
