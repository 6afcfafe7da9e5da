// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Thread attachment to the host VM for callbacks arriving on peer threads.
//
// An `Attachment` remembers whether it did the attaching. Only then does it
// detach on drop, so a thread that was attached on entry (a Java thread, or
// a worker we attached for its whole life) is left exactly as it was.

use jni::JavaVM;

use phonetop_core::error::{PhonetopError, Result};

/// The host-side execution context a native thread can join.
pub trait ThreadAttach {
    fn is_attached(&self) -> bool;

    fn attach(&self) -> Result<()>;

    /// Detach the current thread. Called only by the `Attachment` that attached it.
    fn detach(&self);
}

/// Scoped association of the current thread with a host.
#[must_use = "the thread detaches as soon as the attachment is dropped"]
pub struct Attachment<'a, H: ThreadAttach + ?Sized> {
    host: &'a H,
    acquired: bool,
}

impl<'a, H: ThreadAttach + ?Sized> Attachment<'a, H> {
    /// Attach the current thread unless it already is.
    pub fn acquire(host: &'a H) -> Result<Self> {
        if host.is_attached() {
            return Ok(Self {
                host,
                acquired: false,
            });
        }
        host.attach().inspect_err(|e| {
            tracing::error!(error = %e, "failed to attach thread for callback");
        })?;
        Ok(Self {
            host,
            acquired: true,
        })
    }

    /// Whether this attachment performed the attach (and will detach).
    pub fn acquired(&self) -> bool {
        self.acquired
    }
}

impl<H: ThreadAttach + ?Sized> Drop for Attachment<'_, H> {
    fn drop(&mut self) {
        if self.acquired {
            self.host.detach();
        }
    }
}

/// Run `dispatch` with the current thread attached to `host`.
pub fn with_attachment<H, R>(host: &H, dispatch: impl FnOnce() -> Result<R>) -> Result<R>
where
    H: ThreadAttach + ?Sized,
{
    let _attachment = Attachment::acquire(host)?;
    dispatch()
}

impl ThreadAttach for JavaVM {
    fn is_attached(&self) -> bool {
        self.get_env().is_ok()
    }

    fn attach(&self) -> Result<()> {
        self.attach_current_thread_permanently()
            .map(|_| ())
            .map_err(|e| PhonetopError::Attach(e.to_string()))
    }

    fn detach(&self) {
        // SAFETY: the only caller is an `Attachment` that attached this thread
        // itself, and every local reference it created has gone out of scope.
        unsafe { self.detach_current_thread() };
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    thread_local! {
        static ATTACHED: Cell<bool> = const { Cell::new(false) };
    }

    /// Host VM stand-in tracking attachment per thread.
    #[derive(Default)]
    pub struct FakeHost {
        pub attaches: AtomicUsize,
        pub detaches: AtomicUsize,
        pub refuse: bool,
    }

    impl FakeHost {
        pub fn mark_attached(attached: bool) {
            ATTACHED.with(|a| a.set(attached));
        }

        pub fn current_attached() -> bool {
            ATTACHED.with(Cell::get)
        }
    }

    impl ThreadAttach for FakeHost {
        fn is_attached(&self) -> bool {
            Self::current_attached()
        }

        fn attach(&self) -> Result<()> {
            if self.refuse {
                return Err(PhonetopError::Attach("JNI_ERR".into()));
            }
            self.attaches.fetch_add(1, Ordering::SeqCst);
            Self::mark_attached(true);
            Ok(())
        }

        fn detach(&self) {
            self.detaches.fetch_add(1, Ordering::SeqCst);
            Self::mark_attached(false);
        }
    }
}
