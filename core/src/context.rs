//! Run context: everything one deployment to one host needs to know.
//!
//! Built once per host and never mutated afterwards. Gateways derive the
//! environment of every script they start from it, instead of the process
//! environment being edited in place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::data::layout;
use crate::types::cdist_type::CdistType;
use crate::types::config::Settings;
use crate::types::object::{CdistObject, ObjectName, OBJECT_MARKER};

/// Environment handed to a script, on top of the inherited one.
pub type Env = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// LocalPaths
// ---------------------------------------------------------------------------

/// Paths on the machine running cdist.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPaths {
    pub base_path: PathBuf,
    /// `__global`: root of everything this run produces.
    pub out_path: PathBuf,
    pub object_path: PathBuf,
    pub global_explorer_out_path: PathBuf,
    pub bin_path: PathBuf,
    pub conf_path: PathBuf,
    pub type_path: PathBuf,
    pub global_explorer_path: PathBuf,
    pub manifest_path: PathBuf,
    pub cache_path: PathBuf,
}

impl LocalPaths {
    pub fn new(base_path: &Path, conf_path: &Path, cache_path: &Path) -> Self {
        let out_path = base_path.join("out");
        LocalPaths {
            base_path: base_path.to_path_buf(),
            object_path: out_path.join("object"),
            global_explorer_out_path: out_path.join("explorer"),
            bin_path: out_path.join("bin"),
            out_path,
            conf_path: conf_path.to_path_buf(),
            type_path: conf_path.join("type"),
            global_explorer_path: conf_path.join("explorer"),
            manifest_path: conf_path.join("manifest"),
            cache_path: cache_path.to_path_buf(),
        }
    }

    /// Directories created at the start of a run.
    pub fn run_dirs(&self) -> [&Path; 5] {
        [
            &self.base_path,
            &self.out_path,
            &self.object_path,
            &self.global_explorer_out_path,
            &self.bin_path,
        ]
    }

    pub fn object_dir(&self, name: &ObjectName) -> PathBuf {
        layout::object_dir(&self.object_path, name)
    }

    /// `__object` of a local script.
    pub fn meta_dir(&self, name: &ObjectName) -> PathBuf {
        layout::meta_dir(&self.object_path, name)
    }

    pub fn code_local_path(&self, name: &ObjectName) -> PathBuf {
        layout::meta_dir(&self.object_path, name).join(layout::CODE_LOCAL_FILE)
    }

    pub fn code_remote_path(&self, name: &ObjectName) -> PathBuf {
        layout::meta_dir(&self.object_path, name).join(layout::CODE_REMOTE_FILE)
    }
}

// ---------------------------------------------------------------------------
// RemotePaths
// ---------------------------------------------------------------------------

/// Paths on the target host.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePaths {
    pub base_path: PathBuf,
    pub conf_path: PathBuf,
    pub type_path: PathBuf,
    pub global_explorer_path: PathBuf,
    pub object_path: PathBuf,
}

impl RemotePaths {
    pub fn new(base_path: &Path) -> Self {
        let conf_path = base_path.join("conf");
        RemotePaths {
            base_path: base_path.to_path_buf(),
            type_path: conf_path.join("type"),
            global_explorer_path: conf_path.join("explorer"),
            conf_path,
            object_path: base_path.join("object"),
        }
    }

    pub fn object_dir(&self, name: &ObjectName) -> PathBuf {
        layout::object_dir(&self.object_path, name)
    }

    /// `__object` of an explorer or code running on the target.
    pub fn meta_dir(&self, name: &ObjectName) -> PathBuf {
        self.object_dir(name).join(OBJECT_MARKER)
    }

    pub fn code_remote_path(&self, name: &ObjectName) -> PathBuf {
        self.meta_dir(name).join(layout::CODE_REMOTE_FILE)
    }

    pub fn type_explorer_path(&self, type_name: &str) -> PathBuf {
        self.type_path.join(type_name).join("explorer")
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub target_host: String,
    pub local: LocalPaths,
    pub remote: RemotePaths,
    pub initial_manifest: PathBuf,
    pub debug: bool,
    pub dry_run: bool,
    /// Executable the `bin/<type>` links point at.
    pub emulator: PathBuf,
    /// `PATH` as seen when the context was built.
    search_path: String,
}

impl RunContext {
    pub fn new(target_host: &str, base_path: &Path, settings: &Settings) -> Self {
        let local = LocalPaths::new(base_path, &settings.conf_dir, &settings.cache_dir);
        let initial_manifest = local.manifest_path.join("init");
        RunContext {
            target_host: target_host.to_string(),
            remote: RemotePaths::new(&settings.remote_base_path),
            initial_manifest,
            local,
            debug: false,
            dry_run: false,
            emulator: std::env::current_exe().unwrap_or_else(|_| PathBuf::from("cdist")),
            search_path: std::env::var("PATH").unwrap_or_default(),
        }
    }

    pub fn with_initial_manifest(mut self, path: &Path) -> Self {
        self.initial_manifest = path.to_path_buf();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_emulator(mut self, emulator: &Path) -> Self {
        self.emulator = emulator.to_path_buf();
        self
    }

    pub fn cdist_type(&self, type_name: &str) -> CdistType {
        CdistType::new(&self.local.type_path, type_name)
    }

    /// Archive location of this host's finished run.
    pub fn archive_path(&self) -> PathBuf {
        self.local.cache_path.join(&self.target_host)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.local.cache_path.join(format!("{}.lock", self.target_host))
    }

    /// Variables every local script sees.
    pub fn base_env(&self) -> Env {
        let mut env = Env::new();
        env.insert("__target_host".into(), self.target_host.clone());
        env.insert("__global".into(), self.local.out_path.display().to_string());
        env.insert(
            "__cdist_type_base_path".into(),
            self.local.type_path.display().to_string(),
        );
        let path = if self.search_path.is_empty() {
            self.local.bin_path.display().to_string()
        } else {
            format!("{}:{}", self.local.bin_path.display(), self.search_path)
        };
        env.insert("PATH".into(), path);
        if self.debug {
            env.insert("__debug".into(), "yes".into());
        }
        env
    }

    /// Environment of a manifest run. `manifest` is the script being run.
    pub fn manifest_env(&self, manifest: &Path) -> Env {
        let mut env = self.base_env();
        env.insert("__cdist_manifest".into(), manifest.display().to_string());
        env.insert(
            "__manifest".into(),
            self.local.manifest_path.display().to_string(),
        );
        env
    }

    /// Environment of a script acting on behalf of `object`.
    pub fn object_env(&self, object: &CdistObject) -> Env {
        let mut env = self.base_env();
        env.insert(
            "__object".into(),
            self.local.meta_dir(&object.name).display().to_string(),
        );
        env.insert("__object_id".into(), object.object_id().to_string());
        env.insert("__object_fq".into(), object.name.to_string());
        env.insert(
            "__type".into(),
            self.cdist_type(object.type_name()).path().display().to_string(),
        );
        env
    }

    /// Environment of a type manifest run for `object`.
    pub fn type_manifest_env(&self, object: &CdistObject, manifest: &Path) -> Env {
        let mut env = self.object_env(object);
        env.insert("__cdist_manifest".into(), manifest.display().to_string());
        env
    }

    /// Environment of an explorer run on the target. Only remote paths.
    pub fn remote_explorer_env(&self, object: Option<&CdistObject>) -> Env {
        let mut env = Env::new();
        env.insert("__target_host".into(), self.target_host.clone());
        env.insert(
            "__explorer".into(),
            self.remote.global_explorer_path.display().to_string(),
        );
        if let Some(object) = object {
            env.insert(
                "__object".into(),
                self.remote.meta_dir(&object.name).display().to_string(),
            );
            env.insert("__object_id".into(), object.object_id().to_string());
            env.insert("__object_fq".into(), object.name.to_string());
            env.insert(
                "__type_explorer".into(),
                self.remote
                    .type_explorer_path(object.type_name())
                    .display()
                    .to_string(),
            );
        }
        if self.debug {
            env.insert("__debug".into(), "yes".into());
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        let settings = Settings {
            conf_dir: PathBuf::from("/cdist/conf"),
            cache_dir: PathBuf::from("/cdist/cache"),
            ..Settings::default()
        };
        RunContext::new("web1", Path::new("/tmp/run"), &settings)
    }

    fn object(name: &str) -> CdistObject {
        CdistObject::new(name.parse().unwrap(), Vec::new())
    }

    #[test]
    fn local_layout() {
        let c = ctx();
        assert_eq!(c.local.out_path, PathBuf::from("/tmp/run/out"));
        assert_eq!(c.local.object_path, PathBuf::from("/tmp/run/out/object"));
        assert_eq!(c.local.bin_path, PathBuf::from("/tmp/run/out/bin"));
        assert_eq!(c.local.type_path, PathBuf::from("/cdist/conf/type"));
        assert_eq!(c.initial_manifest, PathBuf::from("/cdist/conf/manifest/init"));
        assert_eq!(c.archive_path(), PathBuf::from("/cdist/cache/web1"));
    }

    #[test]
    fn remote_layout() {
        let c = ctx();
        assert_eq!(c.remote.conf_path, PathBuf::from("/var/lib/cdist/conf"));
        let n: ObjectName = "__file/etc/motd".parse().unwrap();
        assert_eq!(
            c.remote.code_remote_path(&n),
            PathBuf::from("/var/lib/cdist/object/__file/etc/motd/.cdist/code-remote")
        );
    }

    #[test]
    fn base_env_prefixes_path_with_bin() {
        let env = ctx().base_env();
        assert_eq!(env["__target_host"], "web1");
        assert_eq!(env["__global"], "/tmp/run/out");
        assert!(env["PATH"].starts_with("/tmp/run/out/bin"));
        assert!(!env.contains_key("__debug"));
    }

    #[test]
    fn debug_is_exported() {
        let env = ctx().with_debug(true).base_env();
        assert_eq!(env["__debug"], "yes");
    }

    #[test]
    fn object_env_carries_identity() {
        let c = ctx();
        let env = c.object_env(&object("__file/etc/motd"));
        assert_eq!(env["__object"], "/tmp/run/out/object/__file/etc/motd/.cdist");
        assert_eq!(env["__object_id"], "etc/motd");
        assert_eq!(env["__object_fq"], "__file/etc/motd");
        assert_eq!(env["__type"], "/cdist/conf/type/__file");
    }

    #[test]
    fn manifest_env_records_script() {
        let c = ctx();
        let env = c.manifest_env(Path::new("/cdist/conf/manifest/init"));
        assert_eq!(env["__cdist_manifest"], "/cdist/conf/manifest/init");
        assert_eq!(env["__cdist_type_base_path"], "/cdist/conf/type");
        assert_eq!(env["__manifest"], "/cdist/conf/manifest");
    }

    #[test]
    fn remote_explorer_env_uses_remote_paths() {
        let c = ctx();
        let env = c.remote_explorer_env(Some(&object("__file/etc/motd")));
        assert_eq!(env["__explorer"], "/var/lib/cdist/conf/explorer");
        assert_eq!(env["__type_explorer"], "/var/lib/cdist/conf/type/__file/explorer");
        assert_eq!(env["__object"], "/var/lib/cdist/object/__file/etc/motd/.cdist");
        assert!(!env.contains_key("__global"));
    }
}
