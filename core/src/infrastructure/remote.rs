//! Remote invocation builder.
//!
//! `Remote` turns "run this on the target" and "copy this to the target"
//! into local invocations of the configured `remote_exec` / `remote_copy`
//! programs. It never spawns anything itself.

use std::borrow::Cow;
use std::path::Path;

use shell_escape::escape;

use super::runner::Invocation;
use crate::context::Env;
use crate::error::{CdistError, Result};


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    target_host: String,
    exec: Vec<String>,
    copy: Vec<String>,
}


impl Remote {
    /// `remote_exec` / `remote_copy` are whitespace-separated argv prefixes,
    /// e.g. `ssh -o User=root -q`.
    pub fn new(target_host: &str, remote_exec: &str, remote_copy: &str) -> Result<Self> {
        let exec = split_command("remote_exec", remote_exec)?;
        let copy = split_command("remote_copy", remote_copy)?;
        Ok(Remote {
            target_host: target_host.to_string(),
            exec,
            copy,
        })
    }

    pub fn target_host(&self) -> &str {
        &self.target_host
    }

    /// Run `command` on the target with `env` exported first.
    pub fn exec(&self, command: &[String], env: &Env) -> Invocation {
        let mut line = String::new();
        for (key, value) in env {
            line.push_str(&format!("export {}={}; ", key, quote(value)));
        }
        let quoted: Vec<String> = command.iter().map(|c| quote(c)).collect();
        line.push_str(&quoted.join(" "));

        Invocation::new(&self.exec[0])
            .args(self.exec[1..].iter().cloned())
            .arg(self.target_host.clone())
            .arg(line)
    }

    /// Copy a local file or directory to `destination` on the target.
    pub fn copy(&self, source: &Path, destination: &Path) -> Invocation {
        let mut invocation = Invocation::new(&self.copy[0]).args(self.copy[1..].iter().cloned());
        if source.is_dir() {
            invocation = invocation.arg("-r");
        }
        invocation
            .arg(source.display().to_string())
            .arg(format!("{}:{}", self.target_host, destination.display()))
    }

    pub fn mkdir(&self, path: &Path) -> Invocation {
        self.exec(
            &["mkdir".into(), "-p".into(), path.display().to_string()],
            &Env::new(),
        )
    }

    pub fn rmdir(&self, path: &Path) -> Invocation {
        self.exec(
            &["rm".into(), "-rf".into(), path.display().to_string()],
            &Env::new(),
        )
    }
}


fn split_command(setting: &str, value: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = value.split_whitespace().map(String::from).collect();
    if parts.is_empty() {
        return Err(CdistError::Settings(format!("{} is empty", setting)));
    }
    Ok(parts)
}


fn quote(s: &str) -> String {
    escape(Cow::Borrowed(s)).into_owned()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> Remote {
        Remote::new("web1", "ssh -o User=root -q", "scp -o User=root -q").unwrap()
    }

    #[test]
    fn exec_prefixes_remote_exec_and_host() {
        let inv = remote().exec(&["/var/lib/cdist/conf/explorer/os".into()], &Env::new());
        assert_eq!(inv.program, Path::new("ssh"));
        assert_eq!(
            inv.args,
            vec!["-o", "User=root", "-q", "web1", "/var/lib/cdist/conf/explorer/os"]
        );
    }

    #[test]
    fn exec_exports_env_quoted() {
        let mut env = Env::new();
        env.insert("__object_id".into(), "my file".into());
        let inv = remote().exec(&["true".into()], &env);
        assert_eq!(inv.args.last().unwrap(), "export __object_id='my file'; true");
    }

    #[test]
    fn copy_targets_host_path() {
        let inv = remote().copy(
            Path::new("/nonexistent/code-remote"),
            Path::new("/var/lib/cdist/object/x/.cdist/code-remote"),
        );
        assert_eq!(inv.program, Path::new("scp"));
        assert_eq!(
            inv.args,
            vec![
                "-o",
                "User=root",
                "-q",
                "/nonexistent/code-remote",
                "web1:/var/lib/cdist/object/x/.cdist/code-remote"
            ]
        );
    }

    #[test]
    fn copy_of_directory_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let inv = remote().copy(dir.path(), Path::new("/var/lib/cdist/conf/explorer"));
        assert!(inv.args.contains(&"-r".to_string()));
    }

    #[test]
    fn mkdir_and_rmdir() {
        let r = remote();
        assert_eq!(
            r.mkdir(Path::new("/var/lib/cdist")).args.last().unwrap(),
            "mkdir -p /var/lib/cdist"
        );
        assert_eq!(
            r.rmdir(Path::new("/var/lib/cdist")).args.last().unwrap(),
            "rm -rf /var/lib/cdist"
        );
    }

    #[test]
    fn empty_remote_exec_is_rejected() {
        assert!(Remote::new("web1", "  ", "scp").is_err());
    }
}
