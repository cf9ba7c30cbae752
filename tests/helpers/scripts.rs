#![allow(dead_code)]
//! Throwaway collector scripts on disk.

use public_exporter::CollectorSpec;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct ScriptDir {
    dir: TempDir,
}

impl ScriptDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes a bash script and returns its path.
    pub fn shell(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/bash\n{}\n", body)).unwrap();
        path
    }

    /// A shell collector spec for the script `name`.
    pub fn shell_spec(&self, name: &str, body: &str, interval: u64, timeout: u64) -> CollectorSpec {
        let path = self.shell(name, body);
        CollectorSpec {
            script_path: path.to_string_lossy().into_owned(),
            script_type: "shell".to_string(),
            interval_seconds: interval,
            timeout_seconds: timeout,
            enabled: true,
        }
    }
}
