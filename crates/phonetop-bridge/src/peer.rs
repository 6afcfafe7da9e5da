// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Peer library resolution and entry point binding.
//
// Peer libraries are loaded by the host (`System.loadLibrary`) before any of
// this runs. We only ever ask the dynamic linker for a handle to an object
// that is already mapped (`RTLD_NOLOAD`), and we never `dlclose` it: the
// handle lives as long as the process.

use std::collections::HashMap;
use std::ffi::{CStr, CString, c_void};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use phonetop_core::error::{PhonetopError, Result};

/// Something that can answer "where does this symbol live".
pub trait SymbolSource: Send + Sync {
    /// Library name the symbols belong to, for diagnostics.
    fn library(&self) -> &str;

    /// Address of `symbol`, or `None` if it is not exported.
    fn lookup(&self, symbol: &str) -> Option<NonNull<c_void>>;
}

/// Shared handle to a resolved peer library.
pub type PeerHandle = Arc<dyn SymbolSource>;

// ---------------------------------------------------------------------------
// dlopen-backed peer
// ---------------------------------------------------------------------------

/// A shared object that was already resident when we asked for it.
pub struct ResidentLibrary {
    name: String,
    handle: NonNull<c_void>,
}

// dlopen handles are process-global, safe to share across threads.
unsafe impl Send for ResidentLibrary {}
unsafe impl Sync for ResidentLibrary {}

impl ResidentLibrary {
    /// Get a handle to `name` without loading it.
    ///
    /// Fails with [`PhonetopError::Link`] when the library is not mapped yet;
    /// loading it is the host's job.
    pub fn open(name: &str) -> Result<Self> {
        let c_name = CString::new(name).map_err(|_| PhonetopError::Link {
            library: name.into(),
            detail: "library name contains a NUL byte".into(),
        })?;

        // SAFETY: `c_name` is NUL-terminated and outlives the call.
        let handle = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_NOW | libc::RTLD_NOLOAD) };
        match NonNull::new(handle) {
            Some(handle) => Ok(Self {
                name: name.into(),
                handle,
            }),
            None => Err(PhonetopError::Link {
                library: name.into(),
                detail: last_dl_error(),
            }),
        }
    }
}

impl SymbolSource for ResidentLibrary {
    fn library(&self) -> &str {
        &self.name
    }

    fn lookup(&self, symbol: &str) -> Option<NonNull<c_void>> {
        let c_symbol = CString::new(symbol).ok()?;
        // SAFETY: `handle` came from a successful dlopen and is never closed.
        let address = unsafe { libc::dlsym(self.handle.as_ptr(), c_symbol.as_ptr()) };
        NonNull::new(address)
    }
}

fn last_dl_error() -> String {
    // SAFETY: dlerror returns null or a NUL-terminated, thread-local message.
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        return "unknown dynamic linker error".into();
    }
    // SAFETY: checked non-null above.
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

// ---------------------------------------------------------------------------
// In-memory symbol table
// ---------------------------------------------------------------------------

/// Symbol table built in-process, for peers linked statically into the host.
pub struct SymbolTable {
    name: String,
    symbols: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            symbols: HashMap::new(),
        }
    }

    /// Register `symbol` at `address` (a function pointer cast to `usize`).
    pub fn with(mut self, symbol: &str, address: usize) -> Self {
        self.symbols.insert(symbol.into(), address);
        self
    }
}

impl SymbolSource for SymbolTable {
    fn library(&self) -> &str {
        &self.name
    }

    fn lookup(&self, symbol: &str) -> Option<NonNull<c_void>> {
        self.symbols
            .get(symbol)
            .and_then(|&address| NonNull::new(address as *mut c_void))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Strategy for turning a library name into a [`PeerHandle`].
pub trait LibraryOpener: Send + Sync {
    fn open(&self, name: &str) -> Result<PeerHandle>;
}

/// Default opener: `dlopen` with `RTLD_NOLOAD`.
pub struct ResidentOpener;

impl LibraryOpener for ResidentOpener {
    fn open(&self, name: &str) -> Result<PeerHandle> {
        Ok(Arc::new(ResidentLibrary::open(name)?))
    }
}

impl<F> LibraryOpener for F
where
    F: Fn(&str) -> Result<PeerHandle> + Send + Sync,
{
    fn open(&self, name: &str) -> Result<PeerHandle> {
        self(name)
    }
}

/// One handle per peer library name, acquired on first use and kept forever.
pub struct LibraryRegistry {
    opener: Box<dyn LibraryOpener>,
    handles: Mutex<HashMap<String, PeerHandle>>,
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::with_opener(ResidentOpener)
    }

    pub fn with_opener(opener: impl LibraryOpener + 'static) -> Self {
        Self {
            opener: Box::new(opener),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached handle for `name`, opening it on first use.
    ///
    /// The lock is held across the open so concurrent first calls resolve
    /// once. Failures are not cached: the host may load the library later.
    pub fn resolve(&self, name: &str) -> Result<PeerHandle> {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = handles.get(name) {
            return Ok(Arc::clone(handle));
        }

        let handle = self.opener.open(name).inspect_err(|e| {
            tracing::error!(library = name, error = %e, "failed to get handle for peer library");
        })?;
        tracing::info!(library = name, "got handle to peer library");
        handles.insert(name.to_owned(), Arc::clone(&handle));
        Ok(handle)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Whether a missing symbol is fatal for the adapter that wants it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Required,
    Optional,
}

/// A resolved function address together with the name it was found under.
#[derive(Clone, Copy)]
pub struct EntryPoint<F: Copy> {
    symbol: &'static str,
    function: F,
}

impl<F: Copy> EntryPoint<F> {
    pub fn symbol(&self) -> &'static str {
        self.symbol
    }

    pub fn get(&self) -> F {
        self.function
    }
}

impl<F: Copy> std::fmt::Debug for EntryPoint<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPoint")
            .field("symbol", &self.symbol)
            .finish()
    }
}

/// Look up `symbol` in `peer` and reinterpret it as the function type `F`.
///
/// Returns `Ok(None)` for an absent optional symbol and
/// [`PhonetopError::Symbol`] for an absent required one.
///
/// # Safety
///
/// `F` must be an `unsafe extern "C" fn` type whose signature matches the
/// exported symbol exactly.
pub unsafe fn bind<F: Copy>(
    peer: &dyn SymbolSource,
    symbol: &'static str,
    binding: Binding,
) -> Result<Option<EntryPoint<F>>> {
    const {
        assert!(
            std::mem::size_of::<F>() == std::mem::size_of::<*mut c_void>(),
            "entry point type must be a thin function pointer"
        )
    };

    match peer.lookup(symbol) {
        Some(address) => {
            // SAFETY: sizes match (checked at compile time); signature is the caller's contract.
            let function = unsafe { std::mem::transmute_copy::<*mut c_void, F>(&address.as_ptr()) };
            tracing::debug!(library = peer.library(), symbol, "bound entry point");
            Ok(Some(EntryPoint { symbol, function }))
        }
        None if binding == Binding::Optional => {
            tracing::info!(library = peer.library(), symbol, "optional entry point not exported");
            Ok(None)
        }
        None => {
            tracing::error!(library = peer.library(), symbol, "required entry point not exported");
            Err(PhonetopError::Symbol {
                library: peer.library().into(),
                symbol: symbol.into(),
            })
        }
    }
}

/// [`bind`] with [`Binding::Required`].
///
/// # Safety
///
/// Same contract as [`bind`].
pub unsafe fn bind_required<F: Copy>(
    peer: &dyn SymbolSource,
    symbol: &'static str,
) -> Result<EntryPoint<F>> {
    // SAFETY: forwarded to the caller.
    let bound = unsafe { bind::<F>(peer, symbol, Binding::Required) }?;
    bound.ok_or_else(|| PhonetopError::Symbol {
        library: peer.library().into(),
        symbol: symbol.into(),
    })
}

/// [`bind`] with [`Binding::Optional`].
///
/// # Safety
///
/// Same contract as [`bind`].
pub unsafe fn bind_optional<F: Copy>(
    peer: &dyn SymbolSource,
    symbol: &'static str,
) -> Option<EntryPoint<F>> {
    // SAFETY: forwarded to the caller. Optional binding never errors.
    unsafe { bind::<F>(peer, symbol, Binding::Optional) }
        .ok()
        .flatten()
}
