// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adapter over the Go-compiled Tsyne bridge (`libtsyne-bridge.so`).
//
// Three exports are mandatory; everything for embedded rendering, touch
// input and event delivery is optional and degrades to a logged no-op.

use std::ffi::{CStr, c_char, c_float, c_int, c_void};

use phonetop_core::error::{PhonetopError, Result};
use phonetop_core::types::{ScreenSize, TouchEvent, TouchPhase};

use crate::peer::{EntryPoint, SymbolSource, bind_optional, bind_required};
use crate::traits::*;

type InitFn = unsafe extern "C" fn(c_int) -> c_int;
type ServeFn = unsafe extern "C" fn(c_int) -> c_int;
type ServeWithDirFn = unsafe extern "C" fn(c_int, *const c_char) -> c_int;
type ServeEmbeddedFn = unsafe extern "C" fn(c_float, c_float, *const c_char) -> c_int;
type SetCallbackFn = unsafe extern "C" fn(*mut c_void);
type ScreenSizeFn = unsafe extern "C" fn(c_float, c_float);
type TouchFn = unsafe extern "C" fn(c_float, c_float, c_int);
type NextEventFn = unsafe extern "C" fn() -> *mut c_char;
type QueueLenFn = unsafe extern "C" fn() -> c_int;
type SendMessageFn = unsafe extern "C" fn(*const c_char) -> *mut c_char;
type FreeStringFn = unsafe extern "C" fn(*mut c_char);
type ShutdownFn = unsafe extern "C" fn();

/// Resolved exports of the Go bridge.
#[derive(Debug)]
pub struct TsyneBridge {
    init: EntryPoint<InitFn>,
    serve_msgpack: EntryPoint<ServeFn>,
    serve_grpc: EntryPoint<ServeFn>,
    serve_msgpack_with_dir: Option<EntryPoint<ServeWithDirFn>>,
    serve_embedded: Option<EntryPoint<ServeEmbeddedFn>>,
    set_render_callback: Option<EntryPoint<SetCallbackFn>>,
    set_screen_size: Option<EntryPoint<ScreenSizeFn>>,
    touch_down: Option<EntryPoint<TouchFn>>,
    touch_move: Option<EntryPoint<TouchFn>>,
    touch_up: Option<EntryPoint<TouchFn>>,
    set_event_callback: Option<EntryPoint<SetCallbackFn>>,
    next_event: Option<EntryPoint<NextEventFn>>,
    queue_len: Option<EntryPoint<QueueLenFn>>,
    send_message: Option<EntryPoint<SendMessageFn>>,
    free_string: Option<EntryPoint<FreeStringFn>>,
    shutdown: Option<EntryPoint<ShutdownFn>>,
}

impl TsyneBridge {
    /// Bind every export. Fails on the first missing mandatory one.
    pub fn bind(peer: &dyn SymbolSource) -> Result<Self> {
        // SAFETY: each alias above mirrors the cgo-generated prototype of the
        // export it is bound to.
        let bridge = unsafe {
            Self {
                init: bind_required(peer, "TsyneInit")?,
                serve_msgpack: bind_required(peer, "StartBridgeMsgpackUDS")?,
                serve_grpc: bind_required(peer, "StartBridgeGrpc")?,
                serve_msgpack_with_dir: bind_optional(peer, "StartBridgeMsgpackUDSWithDir"),
                serve_embedded: bind_optional(peer, "StartBridgeAndroidEmbedded"),
                set_render_callback: bind_optional(peer, "SetAndroidRenderCallback"),
                set_screen_size: bind_optional(peer, "SetAndroidScreenSize"),
                touch_down: bind_optional(peer, TouchPhase::Down.symbol()),
                touch_move: bind_optional(peer, TouchPhase::Move.symbol()),
                touch_up: bind_optional(peer, TouchPhase::Up.symbol()),
                set_event_callback: bind_optional(peer, "TsyneSetEventCallback"),
                next_event: bind_optional(peer, "TsyneGetNextEvent"),
                queue_len: bind_optional(peer, "TsyneGetEventQueueLength"),
                send_message: bind_optional(peer, "TsyneSendMessage"),
                free_string: bind_optional(peer, "TsyneFreeString"),
                shutdown: bind_optional(peer, "TsyneShutdown"),
            }
        };

        if bridge.serve_msgpack_with_dir.is_some() {
            tracing::info!("bridge supports an explicit socket directory");
        }
        if bridge.serve_embedded.is_some() {
            tracing::info!("bridge supports embedded rendering");
        }
        tracing::info!(library = peer.library(), "bound Go bridge entry points");
        Ok(bridge)
    }

    /// Copy a string the bridge allocated and hand it back for freeing.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a `C.CString` allocation owned by the caller.
    unsafe fn take_string(&self, raw: *mut c_char, free: EntryPoint<FreeStringFn>) -> Option<String> {
        if raw.is_null() {
            return None;
        }
        // SAFETY: non-null and NUL-terminated per the contract above.
        let text = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
        unsafe { (free.get())(raw) };
        Some(text)
    }

    fn touch_entry(&self, phase: TouchPhase) -> Option<EntryPoint<TouchFn>> {
        match phase {
            TouchPhase::Down => self.touch_down,
            TouchPhase::Move => self.touch_move,
            TouchPhase::Up => self.touch_up,
        }
    }
}

impl NativeBridge for TsyneBridge {
    fn init(&self, headless: i32) -> i32 {
        tracing::info!(headless, "calling TsyneInit");
        // SAFETY: bound with the matching prototype in `bind`.
        let code = unsafe { (self.init.get())(headless) };
        tracing::info!(code, "TsyneInit returned");
        code
    }

    fn serve_msgpack(&self, test_mode: i32, socket_dir: Option<&CStr>) -> i32 {
        let code = match (socket_dir, self.serve_msgpack_with_dir) {
            (Some(dir), Some(entry)) => {
                tracing::info!(test_mode, dir = %dir.to_string_lossy(), "calling {}", entry.symbol());
                // SAFETY: `dir` is NUL-terminated and outlives the call.
                unsafe { (entry.get())(test_mode, dir.as_ptr()) }
            }
            _ => {
                tracing::info!(test_mode, "calling {}", self.serve_msgpack.symbol());
                // SAFETY: bound with the matching prototype in `bind`.
                unsafe { (self.serve_msgpack.get())(test_mode) }
            }
        };
        tracing::info!(code, "msgpack server returned");
        code
    }

    fn serve_grpc(&self, test_mode: i32) -> i32 {
        tracing::info!(test_mode, "calling StartBridgeGrpc");
        // SAFETY: bound with the matching prototype in `bind`.
        let code = unsafe { (self.serve_grpc.get())(test_mode) };
        tracing::info!(code, "StartBridgeGrpc returned");
        code
    }

    fn supports_embedded(&self) -> bool {
        self.serve_embedded.is_some()
    }

    fn serve_embedded(&self, size: ScreenSize, socket_dir: Option<&CStr>) -> Result<i32> {
        let entry = self.serve_embedded.ok_or_else(|| {
            PhonetopError::Unavailable("StartBridgeAndroidEmbedded is not exported".into())
        })?;
        let dir = socket_dir.map_or(std::ptr::null(), CStr::as_ptr);
        tracing::info!(%size, "calling StartBridgeAndroidEmbedded");
        // SAFETY: `dir` is null or NUL-terminated and outlives the call.
        let code = unsafe { (entry.get())(size.width, size.height, dir) };
        tracing::info!(code, "StartBridgeAndroidEmbedded returned");
        Ok(code)
    }
}

impl NativeSurface for TsyneBridge {
    fn install_render_callback(&self, callback: RenderCallback) -> bool {
        let Some(entry) = self.set_render_callback else {
            tracing::warn!("SetAndroidRenderCallback is not exported; frames will not be delivered");
            return false;
        };
        // SAFETY: the bridge stores the pointer and calls it with the
        // `RenderCallback` prototype.
        unsafe { (entry.get())(callback as *mut c_void) };
        tracing::info!("render callback registered");
        true
    }

    fn set_screen_size(&self, size: ScreenSize) -> bool {
        let Some(entry) = self.set_screen_size else {
            return false;
        };
        // SAFETY: bound with the matching prototype in `bind`.
        unsafe { (entry.get())(size.width, size.height) };
        tracing::info!(%size, "screen size updated");
        true
    }

    fn send_touch(&self, event: TouchEvent) -> bool {
        let Some(entry) = self.touch_entry(event.phase) else {
            return false;
        };
        if event.phase == TouchPhase::Down {
            tracing::debug!(x = event.x, y = event.y, id = event.pointer_id, "touch down");
        }
        // SAFETY: bound with the matching prototype in `bind`.
        unsafe { (entry.get())(event.x, event.y, event.pointer_id) };
        true
    }
}

impl NativeEvents for TsyneBridge {
    fn install_event_callback(&self, callback: Option<EventCallback>) -> bool {
        let Some(entry) = self.set_event_callback else {
            tracing::warn!("TsyneSetEventCallback is not exported; events stay queued");
            return false;
        };
        let pointer = callback.map_or(std::ptr::null_mut(), |cb| cb as *mut c_void);
        // SAFETY: the bridge hands the pointer to `callEventCallback`, which
        // calls it with the `EventCallback` prototype.
        unsafe { (entry.get())(pointer) };
        true
    }

    fn next_event(&self) -> Option<String> {
        let (next, free) = (self.next_event?, self.free_string?);
        // SAFETY: bound with the matching prototype in `bind`. Strings from
        // TsyneGetNextEvent are ours until handed back to TsyneFreeString.
        unsafe { self.take_string((next.get())(), free) }
    }

    fn queue_len(&self) -> Option<usize> {
        let entry = self.queue_len?;
        // SAFETY: bound with the matching prototype in `bind`.
        let len = unsafe { (entry.get())() };
        Some(usize::try_from(len).unwrap_or(0))
    }

    fn send_message(&self, message: &CStr) -> Option<String> {
        let Some((send, free)) = self.send_message.zip(self.free_string) else {
            tracing::warn!("TsyneSendMessage/TsyneFreeString not exported");
            return None;
        };
        // SAFETY: `message` is NUL-terminated and outlives the call; the
        // response is a C.CString we must return to TsyneFreeString.
        let response = unsafe { self.take_string((send.get())(message.as_ptr()), free) };
        tracing::debug!(answered = response.is_some(), "TsyneSendMessage returned");
        response
    }

    fn shutdown(&self) -> bool {
        let Some(entry) = self.shutdown else {
            return false;
        };
        tracing::info!("calling TsyneShutdown");
        // SAFETY: bound with the matching prototype in `bind`.
        unsafe { (entry.get())() };
        true
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{self, Call};
    use super::*;
    use crate::peer::SymbolTable;
    use std::ffi::CString;

    extern "C" fn ignore_frame(_: *mut u8, _: c_int, _: c_int, _: c_int) {}

    #[test]
    fn missing_mandatory_export_fails_bind() {
        let peer = SymbolTable::new("libtsyne-bridge.so").with("TsyneInit", 1);
        let err = TsyneBridge::bind(&peer).expect_err("StartBridgeMsgpackUDS missing");
        assert!(matches!(
            err,
            PhonetopError::Symbol { ref symbol, .. } if symbol == "StartBridgeMsgpackUDS"
        ));
    }

    #[test]
    fn pass_through_calls_return_peer_codes() {
        let bridge = TsyneBridge::bind(&fake::minimal()).expect("bind");
        fake::take_calls();

        assert_eq!(bridge.init(1), 0);
        assert_eq!(bridge.serve_msgpack(0, None), 7);
        assert_eq!(bridge.serve_grpc(1), -9);
        assert_eq!(
            fake::take_calls(),
            vec![Call::Init(1), Call::Msgpack(0), Call::Grpc(1)]
        );
    }

    #[test]
    fn socket_dir_selects_dir_aware_export() {
        let bridge = TsyneBridge::bind(&fake::full()).expect("bind");
        fake::take_calls();
        let dir = CString::new("/data/user/0/cache").unwrap();

        assert_eq!(bridge.serve_msgpack(1, Some(&dir)), 8);
        assert_eq!(bridge.serve_msgpack(1, None), 7);
        assert_eq!(
            fake::take_calls(),
            vec![
                Call::MsgpackWithDir(1, "/data/user/0/cache".into()),
                Call::Msgpack(1)
            ]
        );
    }

    #[test]
    fn socket_dir_falls_back_without_dir_export() {
        let bridge = TsyneBridge::bind(&fake::minimal()).expect("bind");
        fake::take_calls();
        let dir = CString::new("/tmp/custom").unwrap();

        assert_eq!(bridge.serve_msgpack(0, Some(&dir)), 7);
        assert_eq!(fake::take_calls(), vec![Call::Msgpack(0)]);
    }

    #[test]
    fn optional_exports_degrade_to_no_ops() {
        let bridge = TsyneBridge::bind(&fake::minimal()).expect("bind");
        fake::take_calls();

        assert!(!bridge.supports_embedded());
        assert!(!bridge.install_render_callback(ignore_frame));
        assert!(!bridge.set_screen_size(ScreenSize {
            width: 1.0,
            height: 1.0
        }));
        assert!(!bridge.send_touch(TouchEvent {
            phase: TouchPhase::Move,
            x: 1.0,
            y: 2.0,
            pointer_id: 0
        }));
        assert!(!bridge.install_event_callback(None));
        assert!(bridge.next_event().is_none());
        assert!(bridge.queue_len().is_none());
        assert!(bridge.send_message(c"{}").is_none());
        assert!(!bridge.shutdown());
        assert!(fake::take_calls().is_empty());

        let err = bridge
            .serve_embedded(ScreenSize::default(), None)
            .expect_err("embedded missing");
        assert_eq!(err.sentinel(), -2);
    }

    #[test]
    fn touches_route_by_phase() {
        let bridge = TsyneBridge::bind(&fake::full()).expect("bind");
        fake::take_calls();

        for (phase, x) in [
            (TouchPhase::Down, 10.0),
            (TouchPhase::Move, 11.0),
            (TouchPhase::Up, 12.0),
        ] {
            assert!(bridge.send_touch(TouchEvent {
                phase,
                x,
                y: 5.0,
                pointer_id: 3
            }));
        }
        assert_eq!(
            fake::take_calls(),
            vec![
                Call::Touch("down", 10.0, 5.0, 3),
                Call::Touch("move", 11.0, 5.0, 3),
                Call::Touch("up", 12.0, 5.0, 3),
            ]
        );
    }

    #[test]
    fn embedded_passes_geometry_and_dir() {
        let bridge = TsyneBridge::bind(&fake::full()).expect("bind");
        fake::take_calls();
        let dir = CString::new("/cache").unwrap();
        let size = ScreenSize {
            width: 1080.0,
            height: 2400.0,
        };

        assert_eq!(bridge.serve_embedded(size, Some(&dir)).expect("serve"), 0);
        assert_eq!(bridge.serve_embedded(size, None).expect("serve"), 0);
        assert_eq!(
            fake::take_calls(),
            vec![
                Call::Embedded(1080.0, 2400.0, Some("/cache".into())),
                Call::Embedded(1080.0, 2400.0, None),
            ]
        );
    }

    #[test]
    fn render_callback_pointer_reaches_peer() {
        let bridge = TsyneBridge::bind(&fake::full()).expect("bind");
        fake::take_calls();

        assert!(bridge.install_render_callback(ignore_frame));
        assert_eq!(
            fake::take_calls(),
            vec![Call::RenderCallback(ignore_frame as usize)]
        );
    }

    #[test]
    fn polled_events_are_copied_and_freed() {
        let bridge = TsyneBridge::bind(&fake::full()).expect("bind");
        fake::QUEUE
            .lock()
            .unwrap()
            .push(r#"{"type":"callback","id":"btn1"}"#.into());

        let mut seen = Vec::new();
        while let Some(event) = bridge.next_event() {
            seen.push(event);
        }
        assert!(seen.contains(&r#"{"type":"callback","id":"btn1"}"#.to_string()));
    }

    #[test]
    fn send_message_returns_response_and_frees_it() {
        let bridge = TsyneBridge::bind(&fake::full()).expect("bind");
        fake::take_calls();
        let request = cr#"{"id":"m1","type":"createWindow","payload":{"title":"Hi"}}"#;

        let response = bridge.send_message(request).expect("response");

        let json: serde_json::Value = serde_json::from_str(&response).expect("json");
        assert_eq!(json["success"], true);
        assert_eq!(json["request"]["id"], "m1");
        assert_eq!(
            fake::take_calls(),
            vec![
                Call::Message(request.to_string_lossy().into_owned()),
                Call::FreeString
            ]
        );
    }

    #[test]
    fn null_response_is_not_freed() {
        let bridge = TsyneBridge::bind(&fake::full()).expect("bind");
        fake::take_calls();

        assert!(bridge.send_message(c"").is_none());
        assert_eq!(fake::take_calls(), vec![Call::Message(String::new())]);
    }

    #[test]
    fn queue_length_is_reported_when_exported() {
        let bridge = TsyneBridge::bind(&fake::full()).expect("bind");
        assert!(bridge.queue_len().is_some());
    }
}
