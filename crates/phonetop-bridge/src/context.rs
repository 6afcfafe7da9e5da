// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The bridge context: everything the host surface needs, owned in one place.
//
// Peers are bound lazily on first use. A missing mandatory export latches
// the peer as unusable for the rest of the process; a library that is not
// loaded yet is not latched, so the host can load it and try again.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use jni::JavaVM;

use phonetop_core::config::{BridgeConfig, ReadinessPolicy};
use phonetop_core::error::{PhonetopError, Result};
use phonetop_core::socket::{NodeBridgeConfig, socket_path};
use phonetop_core::types::{LaunchReceipt, ScreenSize, TouchEvent};

use crate::attach::{Attachment, ThreadAttach};
use crate::callback::{CallbackRegistry, CallbackTarget, Deliver};
use crate::launcher::{Launcher, ReadyCondition, WorkerSlot};
use crate::node::NodeRuntime;
use crate::peer::{LibraryRegistry, SymbolSource};
use crate::traits::*;
use crate::tsyne::TsyneBridge;

/// A peer adapter bound at most once.
struct PeerSlot<T> {
    library: String,
    bound: OnceLock<Arc<T>>,
    // Doubles as the one-time initialisation guard.
    failure: Mutex<Option<String>>,
}

impl<T> PeerSlot<T> {
    fn new(library: &str) -> Self {
        Self {
            library: library.into(),
            bound: OnceLock::new(),
            failure: Mutex::new(None),
        }
    }

    fn get(&self) -> Option<Arc<T>> {
        self.bound.get().cloned()
    }

    fn get_or_bind(
        &self,
        registry: &LibraryRegistry,
        bind: impl FnOnce(&dyn SymbolSource) -> Result<T>,
    ) -> Result<Arc<T>> {
        if let Some(adapter) = self.get() {
            return Ok(adapter);
        }

        let mut failure = self.failure.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(adapter) = self.get() {
            return Ok(adapter);
        }
        if let Some(reason) = failure.as_deref() {
            tracing::debug!(library = %self.library, reason, "peer previously failed to bind");
            return Err(PhonetopError::PeerUnusable(self.library.clone()));
        }

        let peer = registry.resolve(&self.library)?;
        match bind(peer.as_ref()) {
            Ok(adapter) => {
                let adapter = Arc::new(adapter);
                let _ = self.bound.set(Arc::clone(&adapter));
                Ok(adapter)
            }
            Err(e) => {
                tracing::error!(library = %self.library, error = %e, "peer unusable for the rest of the process");
                *failure = Some(e.to_string());
                Err(e)
            }
        }
    }
}

/// Process-wide bridge state, constructed once by the host surface.
///
/// `H` is the host VM worker and callback threads attach to, `T` the kind of
/// callback target it dispatches to.
pub struct BridgeContext<H = JavaVM, T = CallbackTarget> {
    config: BridgeConfig,
    registry: LibraryRegistry,
    bridge: PeerSlot<TsyneBridge>,
    node: PeerSlot<NodeRuntime>,
    launcher: Launcher,
    msgpack_worker: Arc<WorkerSlot>,
    embedded_worker: Arc<WorkerSlot>,
    node_worker: Arc<WorkerSlot>,
    socket_dir: RwLock<Option<PathBuf>>,
    screen: Mutex<ScreenSize>,
    callbacks: CallbackRegistry<H, T>,
}

impl BridgeContext {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_registry(config, LibraryRegistry::new())
    }
}

impl<H, T> BridgeContext<H, T>
where
    H: ThreadAttach + Send + Sync + 'static,
    T: Deliver<H> + 'static,
{
    pub fn with_registry(config: BridgeConfig, registry: LibraryRegistry) -> Self {
        tracing::info!(
            bridge = %config.bridge_library,
            node = %config.node_library,
            settle_ms = config.settle_delay_ms,
            "bridge context created"
        );
        Self {
            bridge: PeerSlot::new(&config.bridge_library),
            node: PeerSlot::new(&config.node_library),
            launcher: Launcher::new(config.settle_delay()),
            msgpack_worker: WorkerSlot::new("msgpack"),
            embedded_worker: WorkerSlot::new("embedded"),
            node_worker: WorkerSlot::new("node"),
            socket_dir: RwLock::new(config.socket_dir.clone()),
            screen: Mutex::new(ScreenSize::default()),
            callbacks: CallbackRegistry::new(),
            registry,
            config,
        }
    }

    pub fn callbacks(&self) -> &CallbackRegistry<H, T> {
        &self.callbacks
    }

    // -- Peers ---------------------------------------------------------------

    /// The Go bridge, bound on first use.
    pub fn tsyne(&self) -> Result<Arc<TsyneBridge>> {
        self.bridge.get_or_bind(&self.registry, TsyneBridge::bind)
    }

    /// The Node.js runtime, bound on first use.
    pub fn node(&self) -> Result<Arc<NodeRuntime>> {
        self.node.get_or_bind(&self.registry, NodeRuntime::bind)
    }

    // -- Socket rendezvous ---------------------------------------------------

    /// Record the socket directory used by later launches and path queries.
    pub fn set_socket_dir(&self, dir: PathBuf) {
        tracing::info!(dir = %dir.display(), "socket directory set");
        *self.socket_dir.write().unwrap_or_else(|e| e.into_inner()) = Some(dir);
    }

    /// Directory explicitly chosen by the host, if any.
    pub fn explicit_socket_dir(&self) -> Option<PathBuf> {
        self.socket_dir.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Directory the rendezvous socket lives in.
    pub fn socket_dir(&self) -> PathBuf {
        self.explicit_socket_dir()
            .unwrap_or_else(|| self.config.default_socket_dir.clone())
    }

    /// `<socket dir>/tsyne-<pid>.sock` for this process.
    pub fn socket_path(&self) -> PathBuf {
        socket_path(&self.socket_dir(), std::process::id())
    }

    /// Write `bridge-config.json` for the Node.js project at `path`.
    pub fn write_node_config(&self, path: &Path) -> Result<PathBuf> {
        let socket = self.socket_path();
        NodeBridgeConfig::new(&socket).write_to(path)?;
        tracing::info!(config = %path.display(), socket = %socket.display(), "wrote bridge config");
        Ok(socket)
    }

    fn server_ready_condition(&self) -> ReadyCondition {
        match self.config.readiness {
            ReadinessPolicy::Settle => ReadyCondition::Settle,
            ReadinessPolicy::SocketBound => ReadyCondition::SocketAt(self.socket_path()),
        }
    }

    // -- Pass-through calls --------------------------------------------------

    pub fn init(&self, headless: i32) -> Result<i32> {
        Ok(self.tsyne()?.init(headless))
    }

    /// Serve msgpack on the calling thread. Blocks.
    pub fn serve_msgpack(&self, test_mode: i32) -> Result<i32> {
        Ok(self.tsyne()?.serve_msgpack(test_mode, None))
    }

    /// Serve gRPC on the calling thread. Blocks.
    pub fn serve_grpc(&self, test_mode: i32) -> Result<i32> {
        Ok(self.tsyne()?.serve_grpc(test_mode))
    }

    // -- Background launches -------------------------------------------------

    /// Start the msgpack server on its own thread.
    pub fn start_bridge_in_background(
        &self,
        test_mode: i32,
        socket_dir: Option<PathBuf>,
    ) -> Result<LaunchReceipt> {
        let bridge = self.tsyne()?;
        if let Some(dir) = socket_dir {
            self.set_socket_dir(dir);
        }
        let dir = self.explicit_socket_dir().map(|d| path_cstring(&d)).transpose()?;

        tracing::info!(test_mode, "starting bridge in background thread");
        self.launcher.launch(
            &self.msgpack_worker,
            self.server_ready_condition(),
            move || bridge.serve_msgpack(test_mode, dir.as_deref()),
        )
    }

    /// Start the embedded renderer on its own thread.
    ///
    /// The worker attaches itself to the host VM before entering Go (the Fyne
    /// Android driver needs JNI), installs `render_callback`, then serves.
    /// Geometry, socket directory and frame target are only recorded once
    /// the launch can go ahead.
    pub fn start_embedded(
        &self,
        size: ScreenSize,
        socket_dir: Option<PathBuf>,
        frame_target: Option<T>,
        render_callback: RenderCallback,
    ) -> Result<LaunchReceipt> {
        let bridge = self.tsyne()?;
        if !bridge.supports_embedded() {
            tracing::error!("StartBridgeAndroidEmbedded not available");
            return Err(PhonetopError::Unavailable(
                "StartBridgeAndroidEmbedded is not exported".into(),
            ));
        }
        let host = self
            .callbacks
            .host()
            .ok_or_else(|| PhonetopError::Attach("no JavaVM captured".into()))?;
        if self.embedded_worker.is_live() {
            return Err(PhonetopError::WorkerBusy(self.embedded_worker.name().into()));
        }
        let dir = socket_dir
            .clone()
            .or_else(|| self.explicit_socket_dir())
            .map(|d| path_cstring(&d))
            .transpose()?;

        *self.screen.lock().unwrap_or_else(|e| e.into_inner()) = size;
        tracing::info!(%size, "screen size set");
        if let Some(dir) = socket_dir {
            self.set_socket_dir(dir);
        }
        if let Some(target) = frame_target {
            self.callbacks.set_frame_target(Some(target));
        }

        self.launcher.launch(
            &self.embedded_worker,
            ReadyCondition::Settle,
            move || {
                let attachment = match Attachment::acquire(host.as_ref()) {
                    Ok(attachment) => attachment,
                    Err(e) => {
                        tracing::error!(error = %e, "embedded worker could not attach to the JVM");
                        return e.sentinel();
                    }
                };
                bridge.install_render_callback(render_callback);
                let code = bridge
                    .serve_embedded(size, dir.as_deref())
                    .unwrap_or_else(|e| e.sentinel());
                drop(attachment);
                code
            },
        )
    }

    /// Run a Node.js script on its own thread. Returns without settling.
    pub fn start_node(&self, script: PathBuf) -> Result<LaunchReceipt> {
        let node = self.node()?;
        tracing::info!(script = %script.display(), "starting Node.js thread");
        self.launcher
            .launch(&self.node_worker, ReadyCondition::Immediate, move || {
                node.run_script(&script).unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Node.js did not start");
                    e.sentinel()
                })
            })
    }

    // -- Surface -------------------------------------------------------------

    pub fn screen_size(&self) -> ScreenSize {
        *self.screen.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record new geometry and forward it if the bridge is already bound.
    pub fn set_screen_size(&self, size: ScreenSize) -> bool {
        *self.screen.lock().unwrap_or_else(|e| e.into_inner()) = size;
        self.bridge
            .get()
            .is_some_and(|bridge| bridge.set_screen_size(size))
    }

    /// Forward a touch if the bridge is already bound and accepts it.
    pub fn send_touch(&self, event: TouchEvent) -> bool {
        self.bridge
            .get()
            .is_some_and(|bridge| bridge.send_touch(event))
    }

    // -- Events --------------------------------------------------------------

    /// Register the Java event target and install `callback` in the bridge.
    ///
    /// Fails with [`PhonetopError::Unavailable`] if the bridge cannot push
    /// events; the host should fall back to [`BridgeContext::poll_event`].
    pub fn register_event_target(&self, target: T, callback: EventCallback) -> Result<()> {
        let bridge = self.tsyne()?;
        self.callbacks.set_event_target(Some(target));
        if !bridge.install_event_callback(Some(callback)) {
            self.callbacks.set_event_target(None);
            return Err(PhonetopError::Unavailable(
                "TsyneSetEventCallback is not exported".into(),
            ));
        }
        tracing::info!("event target registered");
        Ok(())
    }

    pub fn poll_event(&self) -> Result<Option<String>> {
        Ok(self.tsyne()?.next_event())
    }

    /// Number of events queued for polling.
    pub fn pending_events(&self) -> Result<usize> {
        self.tsyne()?.queue_len().ok_or_else(|| {
            PhonetopError::Unavailable("TsyneGetEventQueueLength is not exported".into())
        })
    }

    /// Send one JSON request through the in-process FFI path and return the
    /// bridge's JSON response.
    pub fn send_message(&self, message: &str) -> Result<String> {
        let bridge = self.tsyne()?;
        let request = CString::new(message)
            .map_err(|_| PhonetopError::Unavailable("message contains a NUL byte".into()))?;
        bridge.send_message(&request).ok_or_else(|| {
            PhonetopError::Unavailable("TsyneSendMessage unavailable or returned no response".into())
        })
    }

    /// Stop the bridge application (if bound) and release callback targets.
    pub fn shutdown(&self) -> bool {
        let stopped = match self.bridge.get() {
            Some(bridge) => {
                bridge.install_event_callback(None);
                bridge.shutdown()
            }
            None => false,
        };
        self.callbacks.set_event_target(None);
        self.callbacks.set_frame_target(None);
        tracing::info!(stopped, "bridge shut down");
        stopped
    }
}

fn path_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        PhonetopError::Unavailable(format!("path {} contains a NUL byte", path.display()))
    })
}
