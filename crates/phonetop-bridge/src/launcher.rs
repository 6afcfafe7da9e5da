// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Background launching of blocking peer entry points.
//
// Each launch gets its own OS thread. Threads are never joined or cancelled;
// a server loop simply runs until the process dies. The peers give us no
// readiness notification, so by default the launching call sleeps a fixed
// settle delay before returning. When the worker's readiness is observable
// from outside (the rendezvous socket appearing) we can poll for it instead,
// still bounded by the same delay.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use phonetop_core::error::{PhonetopError, Result};
use phonetop_core::types::{LaunchReceipt, Readiness};

/// Interval between checks for the rendezvous socket.
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What the launching thread waits for before returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyCondition {
    /// Return as soon as the thread is spawned.
    Immediate,
    /// Sleep the full settle delay.
    Settle,
    /// Return once this path exists, or when the settle delay runs out.
    SocketAt(PathBuf),
}

/// At most one live worker per long-running entry point.
#[derive(Debug)]
pub struct WorkerSlot {
    name: &'static str,
    live: AtomicBool,
}

impl WorkerSlot {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            live: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn claim(self: &Arc<Self>) -> Result<SlotClaim> {
        self.live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PhonetopError::WorkerBusy(self.name.into()))?;
        Ok(SlotClaim(Arc::clone(self)))
    }
}

/// Held by the worker thread; frees the slot when the worker returns.
struct SlotClaim(Arc<WorkerSlot>);

impl Drop for SlotClaim {
    fn drop(&mut self) {
        self.0.live.store(false, Ordering::Release);
    }
}

/// Spawns workers and applies the settle policy.
#[derive(Debug, Clone)]
pub struct Launcher {
    settle: Duration,
}

impl Launcher {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle
    }

    /// Run `job` on a fresh thread bound to `slot`.
    ///
    /// The job's return code is logged when it finishes and is never seen by
    /// the caller. Fails with [`PhonetopError::WorkerBusy`] while a previous
    /// job on the same slot is still running, and with
    /// [`PhonetopError::Launch`] if the OS refuses a new thread.
    pub fn launch<F>(
        &self,
        slot: &Arc<WorkerSlot>,
        condition: ReadyCondition,
        job: F,
    ) -> Result<LaunchReceipt>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        let claim = slot.claim()?;
        let name = slot.name();
        let launched_at = Utc::now();
        let started = Instant::now();

        thread::Builder::new()
            .name(format!("phonetop-{name}"))
            .spawn(move || {
                let _claim = claim;
                tracing::info!(worker = name, "worker started");
                let code = job();
                tracing::info!(worker = name, code, "worker returned");
            })
            .map_err(|e| {
                tracing::error!(worker = name, error = %e, "failed to spawn worker thread");
                PhonetopError::Launch {
                    name: name.into(),
                    detail: e.to_string(),
                }
            })?;

        let readiness = match condition {
            ReadyCondition::Immediate => Readiness::Spawned,
            ReadyCondition::Settle => {
                thread::sleep(self.settle);
                Readiness::Settled
            }
            ReadyCondition::SocketAt(path) => self.wait_for_socket(&path, started),
        };

        tracing::info!(worker = name, ?readiness, "worker launched");
        Ok(LaunchReceipt {
            worker: name.into(),
            launched_at,
            readiness,
        })
    }

    fn wait_for_socket(&self, path: &std::path::Path, started: Instant) -> Readiness {
        loop {
            if path.exists() {
                return Readiness::SocketBound;
            }
            let elapsed = started.elapsed();
            if elapsed >= self.settle {
                tracing::warn!(socket = %path.display(), "socket not bound within settle delay");
                return Readiness::TimedOut;
            }
            thread::sleep(SOCKET_POLL_INTERVAL.min(self.settle - elapsed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn wait_until_idle(slot: &WorkerSlot) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while slot.is_live() {
            assert!(Instant::now() < deadline, "worker never finished");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn settle_waits_full_delay_even_if_job_finishes_first() {
        let launcher = Launcher::new(Duration::from_millis(80));
        let slot = WorkerSlot::new("quick");

        let started = Instant::now();
        let receipt = launcher
            .launch(&slot, ReadyCondition::Settle, || 0)
            .expect("launch");

        assert!(started.elapsed() >= Duration::from_millis(80));
        assert_eq!(receipt.readiness, Readiness::Settled);
        assert_eq!(receipt.worker, "quick");
    }

    #[test]
    fn settle_returns_while_job_still_blocks() {
        let launcher = Launcher::new(Duration::from_millis(20));
        let slot = WorkerSlot::new("server");
        let (release, gate) = mpsc::channel::<()>();

        launcher
            .launch(&slot, ReadyCondition::Settle, move || {
                gate.recv().ok();
                0
            })
            .expect("launch");
        assert!(slot.is_live());

        release.send(()).expect("release worker");
        wait_until_idle(&slot);
    }

    #[test]
    fn job_runs_on_named_worker_thread() {
        let launcher = Launcher::new(Duration::ZERO);
        let slot = WorkerSlot::new("node");
        let (tx, rx) = mpsc::channel();

        let receipt = launcher
            .launch(&slot, ReadyCondition::Immediate, move || {
                tx.send(thread::current().name().map(str::to_owned)).ok();
                0
            })
            .expect("launch");

        assert_eq!(receipt.readiness, Readiness::Spawned);
        let name = rx.recv_timeout(Duration::from_secs(5)).expect("job ran");
        assert_eq!(name.as_deref(), Some("phonetop-node"));
    }

    #[test]
    fn second_launch_on_live_slot_is_busy() {
        let launcher = Launcher::new(Duration::ZERO);
        let slot = WorkerSlot::new("msgpack");
        let (release, gate) = mpsc::channel::<()>();

        launcher
            .launch(&slot, ReadyCondition::Immediate, move || {
                gate.recv().ok();
                0
            })
            .expect("first launch");

        let err = launcher
            .launch(&slot, ReadyCondition::Immediate, || 0)
            .expect_err("slot is taken");
        assert!(matches!(err, PhonetopError::WorkerBusy(ref n) if n == "msgpack"));
        assert_eq!(err.sentinel(), -6);

        release.send(()).expect("release worker");
        wait_until_idle(&slot);
        launcher
            .launch(&slot, ReadyCondition::Immediate, || 0)
            .expect("slot reusable after worker returns");
    }

    #[test]
    fn socket_condition_returns_when_socket_appears() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("tsyne-1.sock");
        let launcher = Launcher::new(Duration::from_secs(5));
        let slot = WorkerSlot::new("bind");

        let path = socket.clone();
        let started = Instant::now();
        let receipt = launcher
            .launch(&slot, ReadyCondition::SocketAt(socket), move || {
                std::fs::write(&path, b"").ok();
                0
            })
            .expect("launch");

        assert_eq!(receipt.readiness, Readiness::SocketBound);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn socket_condition_times_out_after_settle_delay() {
        let dir = tempfile::tempdir().expect("tempdir");
        let launcher = Launcher::new(Duration::from_millis(40));
        let slot = WorkerSlot::new("never-binds");

        let started = Instant::now();
        let receipt = launcher
            .launch(
                &slot,
                ReadyCondition::SocketAt(dir.path().join("missing.sock")),
                || 0,
            )
            .expect("launch");

        assert_eq!(receipt.readiness, Readiness::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }
}
