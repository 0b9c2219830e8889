use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::convergence::Strategy;

/// User settings from `<config_dir>/settings.yaml`. Every field has a
/// default, so a missing or partial file is fine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Types, global explorers and manifests. Relative paths resolve
    /// against the config directory.
    pub conf_dir: PathBuf,
    /// Where finished runs are archived, one directory per host.
    pub cache_dir: PathBuf,
    pub remote_base_path: PathBuf,
    pub remote_exec: String,
    pub remote_copy: String,
    /// Per-script timeout. `None` waits forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_timeout_secs: Option<u64>,
    pub lock_timeout_ms: u64,
    pub strategy: Strategy,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            conf_dir: PathBuf::from("conf"),
            cache_dir: PathBuf::from("cache"),
            remote_base_path: PathBuf::from("/var/lib/cdist"),
            remote_exec: "ssh -o User=root -q".into(),
            remote_copy: "scp -o User=root -q".into(),
            script_timeout_secs: None,
            lock_timeout_ms: 5000,
            strategy: Strategy::FixedPoint,
        }
    }
}
