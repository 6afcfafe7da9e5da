// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// C-callable helper the Go bridge links against to invoke an event callback
// it only holds as an opaque pointer.

use std::ffi::{c_char, c_void};

use crate::traits::EventCallback;

/// Call `callback` with `event_json`. A null callback is ignored.
///
/// # Safety
///
/// `callback` must be null or a function with the [`EventCallback`]
/// prototype; `event_json` must satisfy whatever that function expects
/// (normally a NUL-terminated string valid for the call).
#[allow(non_snake_case)]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn callEventCallback(callback: *mut c_void, event_json: *const c_char) {
    if callback.is_null() {
        return;
    }
    // SAFETY: non-null and, per the contract above, an `EventCallback`.
    let callback: EventCallback = unsafe { std::mem::transmute::<*mut c_void, EventCallback>(callback) };
    unsafe { callback(event_json) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::ffi::CStr;

    thread_local! {
        static SEEN: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    extern "C" fn collect(json: *const c_char) {
        let text = unsafe { CStr::from_ptr(json) }.to_string_lossy().into_owned();
        SEEN.with(|s| s.borrow_mut().push(text));
    }

    #[test]
    fn forwards_json_to_callback() {
        let json = cr#"{"type":"click","widgetId":"ok"}"#;
        unsafe { callEventCallback(collect as *mut c_void, json.as_ptr()) };
        SEEN.with(|s| assert_eq!(*s.borrow(), vec![r#"{"type":"click","widgetId":"ok"}"#]));
    }

    #[test]
    fn null_callback_is_ignored() {
        unsafe { callEventCallback(std::ptr::null_mut(), c"{}".as_ptr()) };
        SEEN.with(|s| assert!(s.borrow().is_empty()));
    }
}
