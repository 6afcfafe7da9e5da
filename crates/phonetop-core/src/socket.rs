// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rendezvous socket naming and the config file handed to the Node.js side.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File name of the msgpack socket the Go bridge binds for process `pid`.
pub fn socket_file_name(pid: u32) -> String {
    format!("tsyne-{pid}.sock")
}

/// Full rendezvous path inside `dir` for process `pid`.
pub fn socket_path(dir: &Path, pid: u32) -> PathBuf {
    dir.join(socket_file_name(pid))
}

/// Contents of `bridge-config.json`, read by the Node.js project at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeBridgeConfig {
    pub socket_path: String,
}

impl NodeBridgeConfig {
    pub fn new(socket_path: &Path) -> Self {
        Self {
            socket_path: socket_path.to_string_lossy().into_owned(),
        }
    }

    /// Write the config as JSON to `path`, replacing any previous file.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
