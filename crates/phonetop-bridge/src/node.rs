// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adapter over the embedded Node.js runtime (`libnode.so`).

use std::ffi::{CString, c_char, c_int};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use phonetop_core::error::{PhonetopError, Result};

use crate::peer::{EntryPoint, SymbolSource, bind_required};
use crate::traits::NativeScriptHost;

/// Itanium-mangled `int node::Start(int argc, char** argv)`.
pub const NODE_START_SYMBOL: &str = "_ZN4node5StartEiPPc";

type NodeStartFn = unsafe extern "C" fn(c_int, *mut *mut c_char) -> c_int;

/// Resolved `node::Start`.
#[derive(Debug)]
pub struct NodeRuntime {
    start: EntryPoint<NodeStartFn>,
}

impl NodeRuntime {
    pub fn bind(peer: &dyn SymbolSource) -> Result<Self> {
        // SAFETY: `NodeStartFn` is the C ABI view of `node::Start(int, char**)`.
        let start = unsafe { bind_required(peer, NODE_START_SYMBOL) }?;
        tracing::info!(library = peer.library(), "bound node::Start");
        Ok(Self { start })
    }
}

impl NativeScriptHost for NodeRuntime {
    fn run_script(&self, script: &Path) -> Result<i32> {
        let script_arg = CString::new(script.as_os_str().as_bytes()).map_err(|_| {
            PhonetopError::Unavailable(format!("script path {} contains a NUL byte", script.display()))
        })?;
        let program_arg = c"node".to_owned();

        // node::Start may rewrite argv in place (process title), so hand it
        // owned, writable buffers and take them back afterwards.
        let program = program_arg.into_raw();
        let script_ptr = script_arg.into_raw();
        let mut argv = [program, script_ptr, std::ptr::null_mut()];

        tracing::info!(script = %script.display(), "starting Node.js");
        // SAFETY: argv holds two valid C strings followed by a null terminator.
        let code = unsafe { (self.start.get())(2, argv.as_mut_ptr()) };
        tracing::info!(code, "Node.js exited");

        // SAFETY: both pointers came from `CString::into_raw` above.
        unsafe {
            drop(CString::from_raw(program));
            drop(CString::from_raw(script_ptr));
        }
        Ok(code)
    }
}
