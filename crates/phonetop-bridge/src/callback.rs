// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host-side callback targets and delivery from peer threads.
//
// The Go bridge calls us back on threads it owns (render loop, event
// goroutines). The registry attaches that thread to the host for the
// duration of each delivery, unless it was attached already.

use std::sync::{Arc, Mutex, OnceLock};

use jni::objects::{GlobalRef, JMethodID, JObject, JValue};
use jni::signature::{Primitive, ReturnType};
use jni::{JNIEnv, JavaVM};

use phonetop_core::error::{PhonetopError, Result};
use phonetop_core::types::FrameLayout;

use crate::attach::{ThreadAttach, with_attachment};

/// Name and JNI signature of the method a target must expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchMethod {
    pub name: &'static str,
    pub signature: &'static str,
}

/// `void onFrame(ByteBuffer pixels, int width, int height, int stride)`.
pub const FRAME_METHOD: DispatchMethod = DispatchMethod {
    name: "onFrame",
    signature: "(Ljava/nio/ByteBuffer;III)V",
};

/// `void onEvent(String json)`.
pub const EVENT_METHOD: DispatchMethod = DispatchMethod {
    name: "onEvent",
    signature: "(Ljava/lang/String;)V",
};

/// A Java object pinned by a global reference, with its dispatch method resolved.
pub struct CallbackTarget {
    target: GlobalRef,
    method: JMethodID,
    selector: DispatchMethod,
}

impl CallbackTarget {
    /// Pin `target` and look up `selector` on its class, once.
    ///
    /// Fails with [`PhonetopError::Binding`] if the class has no such method;
    /// the global reference is released again in that case.
    pub fn register(env: &mut JNIEnv, target: &JObject, selector: DispatchMethod) -> Result<Self> {
        let binding_err = |detail: String| PhonetopError::Binding {
            method: selector.name.into(),
            signature: selector.signature.into(),
            detail,
        };

        let global = env
            .new_global_ref(target)
            .map_err(|e| binding_err(e.to_string()))?;
        let class = env
            .get_object_class(target)
            .map_err(|e| binding_err(e.to_string()))?;
        let method = match env.get_method_id(&class, selector.name, selector.signature) {
            Ok(method) => method,
            Err(e) => {
                // GetMethodID leaves NoSuchMethodError pending.
                env.exception_clear().ok();
                tracing::error!(
                    method = selector.name,
                    signature = selector.signature,
                    "callback target is missing its dispatch method"
                );
                return Err(binding_err(e.to_string()));
            }
        };

        tracing::info!(method = selector.name, "callback target registered");
        Ok(Self {
            target: global,
            method,
            selector,
        })
    }

    fn call(&self, env: &mut JNIEnv, args: &[jni::sys::jvalue]) -> Result<()> {
        // SAFETY: `method` was resolved on this target's class with
        // `selector.signature`, which returns void and takes exactly `args`.
        let outcome = unsafe {
            env.call_method_unchecked(
                &self.target,
                self.method,
                ReturnType::Primitive(Primitive::Void),
                args,
            )
        };
        if let Err(e) = outcome {
            // A throwing handler must not leave an exception pending on a
            // peer-owned thread.
            if env.exception_check().unwrap_or(false) {
                env.exception_describe().ok();
                env.exception_clear().ok();
            }
            return Err(PhonetopError::Dispatch(format!("{}: {e}", self.selector.name)));
        }
        Ok(())
    }
}

/// Receives frames and events on a thread already attached to host `H`.
pub trait Deliver<H: ?Sized>: Send + Sync {
    /// Hand one frame to the target.
    ///
    /// # Safety
    ///
    /// `pixels` must point to at least `layout.byte_len()` readable bytes that
    /// stay valid until this returns.
    unsafe fn deliver_frame(&self, host: &H, pixels: *mut u8, layout: FrameLayout) -> Result<()>;

    fn deliver_event(&self, host: &H, json: &str) -> Result<()>;
}

impl Deliver<JavaVM> for CallbackTarget {
    /// Wrap `pixels` in a direct `ByteBuffer` (no copy) and call `onFrame`.
    unsafe fn deliver_frame(&self, vm: &JavaVM, pixels: *mut u8, layout: FrameLayout) -> Result<()> {
        let len = layout
            .byte_len()
            .ok_or_else(|| PhonetopError::Dispatch(format!("invalid frame layout {layout:?}")))?;
        let mut env = vm.get_env().map_err(|e| PhonetopError::Attach(e.to_string()))?;
        // SAFETY: guaranteed by the caller for the duration of this call.
        let buffer = unsafe { env.new_direct_byte_buffer(pixels, len) }
            .map_err(|e| PhonetopError::Dispatch(format!("NewDirectByteBuffer: {e}")))?;
        let args = [
            JValue::Object(&buffer).as_jni(),
            JValue::Int(layout.width).as_jni(),
            JValue::Int(layout.height).as_jni(),
            JValue::Int(layout.stride).as_jni(),
        ];
        let result = self.call(&mut env, &args);
        env.delete_local_ref(buffer).ok();
        result
    }

    /// Call `onEvent` with `json`.
    fn deliver_event(&self, vm: &JavaVM, json: &str) -> Result<()> {
        let mut env = vm.get_env().map_err(|e| PhonetopError::Attach(e.to_string()))?;
        let text = env
            .new_string(json)
            .map_err(|e| PhonetopError::Dispatch(format!("NewStringUTF: {e}")))?;
        let args = [JValue::Object(&text).as_jni()];
        let result = self.call(&mut env, &args);
        env.delete_local_ref(text).ok();
        result
    }
}

/// Durable callback state shared by every delivery path.
///
/// In the app `H` is the `JavaVM` captured in `JNI_OnLoad` and `T` a pinned
/// Java object.
pub struct CallbackRegistry<H = JavaVM, T = CallbackTarget> {
    host: OnceLock<Arc<H>>,
    frame: Mutex<Option<Arc<T>>>,
    event: Mutex<Option<Arc<T>>>,
}

impl<H, T> Default for CallbackRegistry<H, T> {
    fn default() -> Self {
        Self {
            host: OnceLock::new(),
            frame: Mutex::new(None),
            event: Mutex::new(None),
        }
    }
}

impl<H, T> CallbackRegistry<H, T>
where
    H: ThreadAttach + Send + Sync,
    T: Deliver<H>,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the process host. Only the first call has any effect.
    pub fn set_host(&self, host: H) -> bool {
        self.host.set(Arc::new(host)).is_ok()
    }

    pub fn host(&self) -> Option<Arc<H>> {
        self.host.get().cloned()
    }

    /// Replace the frame target; `None` clears it.
    pub fn set_frame_target(&self, target: Option<T>) {
        *self.frame.lock().unwrap_or_else(|e| e.into_inner()) = target.map(Arc::new);
    }

    /// Replace the event target; `None` clears it.
    pub fn set_event_target(&self, target: Option<T>) {
        *self.event.lock().unwrap_or_else(|e| e.into_inner()) = target.map(Arc::new);
    }

    pub fn has_frame_target(&self) -> bool {
        self.frame.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn has_event_target(&self) -> bool {
        self.event.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    /// Hand a rendered frame to the registered target, if any.
    ///
    /// Returns `Ok(false)` when there is nowhere to deliver it.
    ///
    /// # Safety
    ///
    /// Same contract as [`Deliver::deliver_frame`].
    pub unsafe fn deliver_frame(&self, pixels: *mut u8, layout: FrameLayout) -> Result<bool> {
        let Some((host, target)) = self.route(&self.frame) else {
            return Ok(false);
        };
        with_attachment(host.as_ref(), || {
            // SAFETY: forwarded to the caller.
            unsafe { target.deliver_frame(&host, pixels, layout) }
        })?;
        Ok(true)
    }

    /// Hand an event to the registered target, if any.
    pub fn deliver_event(&self, json: &str) -> Result<bool> {
        let Some((host, target)) = self.route(&self.event) else {
            return Ok(false);
        };
        with_attachment(host.as_ref(), || target.deliver_event(&host, json))?;
        Ok(true)
    }

    // Snapshot under the lock, deliver outside it, so a slow handler never
    // blocks re-registration.
    fn route(&self, slot: &Mutex<Option<Arc<T>>>) -> Option<(Arc<H>, Arc<T>)> {
        let host = self.host()?;
        let target = slot.lock().unwrap_or_else(|e| e.into_inner()).clone()?;
        Some((host, target))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::attach::fake::FakeHost;

    /// What a recording target saw, and whether the thread was attached.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Delivery {
        Frame(FrameLayout, bool),
        Event(String, bool),
    }

    /// Callback target that appends every delivery to a shared log.
    #[derive(Clone, Default)]
    pub struct Recorder {
        pub log: Arc<Mutex<Vec<Delivery>>>,
        pub fail: bool,
    }

    impl Recorder {
        pub fn deliveries(&self) -> Vec<Delivery> {
            self.log.lock().unwrap().clone()
        }

        fn push(&self, delivery: Delivery) -> Result<()> {
            self.log.lock().unwrap().push(delivery);
            if self.fail {
                return Err(PhonetopError::Dispatch("handler threw".into()));
            }
            Ok(())
        }
    }

    impl Deliver<FakeHost> for Recorder {
        unsafe fn deliver_frame(&self, _: &FakeHost, _: *mut u8, layout: FrameLayout) -> Result<()> {
            self.push(Delivery::Frame(layout, FakeHost::current_attached()))
        }

        fn deliver_event(&self, _: &FakeHost, json: &str) -> Result<()> {
            self.push(Delivery::Event(json.into(), FakeHost::current_attached()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{Delivery, Recorder};
    use super::*;
    use crate::attach::fake::FakeHost;
    use std::sync::atomic::Ordering;

    const LAYOUT: FrameLayout = FrameLayout {
        width: 2,
        height: 2,
        stride: 8,
    };

    #[test]
    fn dispatch_signatures_match_host_classes() {
        assert_eq!(FRAME_METHOD.name, "onFrame");
        assert_eq!(FRAME_METHOD.signature, "(Ljava/nio/ByteBuffer;III)V");
        assert_eq!(EVENT_METHOD.signature, "(Ljava/lang/String;)V");
    }

    #[test]
    fn delivery_without_vm_or_target_is_dropped() {
        let registry: CallbackRegistry = CallbackRegistry::new();
        let mut pixels = [0u8; 16];

        let delivered = unsafe { registry.deliver_frame(pixels.as_mut_ptr(), LAYOUT) };
        assert!(!delivered.expect("no error"));
        assert!(!registry.deliver_event("{}").expect("no error"));
        assert!(registry.host().is_none());
        assert!(!registry.has_frame_target());
        assert!(!registry.has_event_target());
    }

    #[test]
    fn peer_thread_delivery_attaches_for_the_call_only() {
        let registry = Arc::new(CallbackRegistry::<FakeHost, Recorder>::new());
        assert!(registry.set_host(FakeHost::default()));
        let frames = Recorder::default();
        let events = Recorder::default();
        registry.set_frame_target(Some(frames.clone()));
        registry.set_event_target(Some(events.clone()));

        let worker = Arc::clone(&registry);
        std::thread::spawn(move || {
            let mut pixels = [0u8; 16];
            assert!(unsafe { worker.deliver_frame(pixels.as_mut_ptr(), LAYOUT) }.expect("frame"));
            assert!(!FakeHost::current_attached());
            assert!(worker.deliver_event(r#"{"type":"tap"}"#).expect("event"));
            assert!(!FakeHost::current_attached());
        })
        .join()
        .expect("render thread");

        assert_eq!(frames.deliveries(), vec![Delivery::Frame(LAYOUT, true)]);
        assert_eq!(
            events.deliveries(),
            vec![Delivery::Event(r#"{"type":"tap"}"#.into(), true)]
        );
        let host = registry.host().expect("host");
        assert_eq!(host.attaches.load(Ordering::SeqCst), 2);
        assert_eq!(host.detaches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_dispatch_is_reported_and_detaches() {
        let registry = CallbackRegistry::<FakeHost, Recorder>::new();
        registry.set_host(FakeHost::default());
        registry.set_event_target(Some(Recorder {
            fail: true,
            ..Recorder::default()
        }));
        FakeHost::mark_attached(false);

        let err = registry.deliver_event("{}").expect_err("handler threw");

        assert_eq!(err.sentinel(), -8);
        assert!(!FakeHost::current_attached());
        let host = registry.host().expect("host");
        assert_eq!(host.detaches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn only_first_host_is_kept_and_targets_can_be_cleared() {
        let registry = CallbackRegistry::<FakeHost, Recorder>::new();
        assert!(registry.set_host(FakeHost::default()));
        assert!(!registry.set_host(FakeHost::default()));

        registry.set_event_target(Some(Recorder::default()));
        assert!(registry.has_event_target());
        registry.set_event_target(None);
        assert!(!registry.deliver_event("{}").expect("dropped"));
    }
}
