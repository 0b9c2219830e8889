//! Shell code gateway: runs `gencode-*` scripts and executes what they emit.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info};

use super::CodeGateway;
use crate::context::RunContext;
use crate::error::{CdistError, Result};
use crate::infrastructure::runner::SHELL;
use crate::infrastructure::{script_error, CommandRunner, Invocation, Remote, RunError};
use crate::types::object::CdistObject;

/// Prepended to every generated code file.
pub const CODE_HEADER: &str = "#!/bin/sh -e\n";


pub struct ShellCode {
    runner: Rc<dyn CommandRunner>,
    remote: Remote,
}


impl ShellCode {
    pub fn new(runner: Rc<dyn CommandRunner>, remote: Remote) -> Self {
        ShellCode { runner, remote }
    }

    /// Run `script` for `object` and keep its output at `target` when
    /// non-empty. Empty output leaves no file behind.
    fn gencode(
        &self,
        ctx: &RunContext,
        object: &CdistObject,
        script: PathBuf,
        target: PathBuf,
    ) -> Result<Vec<u8>> {
        if !script.is_file() {
            return Ok(Vec::new());
        }
        debug!(object = %object.name, script = %script.display(), "generating code");
        let output = self
            .runner
            .run(&Invocation::script(&script).envs(ctx.object_env(object)))
            .map_err(|e| {
                script_error(e, |message| CdistError::CodeGenFailed {
                    object: object.name.to_string(),
                    script: script.clone(),
                    message,
                })
            })?;

        let body = output
            .strip_prefix(CODE_HEADER.as_bytes())
            .unwrap_or(&output)
            .to_vec();
        if body.is_empty() {
            debug!(object = %object.name, script = %script.display(), "no code generated");
            remove_stale(&target)?;
            return Ok(body);
        }
        write_code(&target, &body)?;
        Ok(body)
    }
}


impl CodeGateway for ShellCode {
    fn run_gencode_local(&self, ctx: &RunContext, object: &CdistObject) -> Result<Vec<u8>> {
        let cdist_type = ctx.cdist_type(object.type_name());
        self.gencode(
            ctx,
            object,
            cdist_type.gencode_local_path(),
            ctx.local.code_local_path(&object.name),
        )
    }

    fn run_gencode_remote(&self, ctx: &RunContext, object: &CdistObject) -> Result<Vec<u8>> {
        let cdist_type = ctx.cdist_type(object.type_name());
        self.gencode(
            ctx,
            object,
            cdist_type.gencode_remote_path(),
            ctx.local.code_remote_path(&object.name),
        )
    }

    fn run_code_local(&self, ctx: &RunContext, object: &CdistObject) -> Result<()> {
        let code = ctx.local.code_local_path(&object.name);
        info!(object = %object.name, "executing local code");
        self.runner
            .run(&Invocation::new(&code).envs(ctx.object_env(object)))
            .map_err(|e| exec_error(e, object, "local"))?;
        Ok(())
    }

    fn transfer_code_remote(&self, ctx: &RunContext, object: &CdistObject) -> Result<()> {
        let source = ctx.local.code_remote_path(&object.name);
        let destination = ctx.remote.code_remote_path(&object.name);
        if let Some(parent) = destination.parent() {
            self.runner
                .run(&self.remote.mkdir(parent))
                .map_err(|e| exec_error(e, object, "remote"))?;
        }
        self.runner
            .run(&self.remote.copy(&source, &destination))
            .map_err(|e| exec_error(e, object, "remote"))?;
        Ok(())
    }

    fn run_code_remote(&self, ctx: &RunContext, object: &CdistObject) -> Result<()> {
        let code = ctx.remote.code_remote_path(&object.name);
        info!(object = %object.name, "executing remote code");
        let command = [
            SHELL.to_string(),
            "-e".to_string(),
            code.display().to_string(),
        ];
        self.runner
            .run(&self.remote.exec(&command, &ctx.remote_explorer_env(Some(object))))
            .map_err(|e| exec_error(e, object, "remote"))?;
        Ok(())
    }
}


fn exec_error(err: RunError, object: &CdistObject, side: &'static str) -> CdistError {
    script_error(err, |message| CdistError::CodeExecFailed {
        object: object.name.to_string(),
        side,
        message,
    })
}


fn write_code(path: &Path, output: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CdistError::io(parent, e))?;
    }
    let mut content = CODE_HEADER.as_bytes().to_vec();
    content.extend_from_slice(output);
    std::fs::write(path, content).map_err(|e| CdistError::io(path, e))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| CdistError::io(path, e))
}


fn remove_stale(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CdistError::io(path, e)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{MockRunner, ShellRunner};
    use crate::types::config::Settings;

    fn context(dir: &Path) -> RunContext {
        let settings = Settings {
            conf_dir: dir.join("conf"),
            cache_dir: dir.join("cache"),
            ..Settings::default()
        };
        RunContext::new("web1", &dir.join("run"), &settings)
    }

    fn object(name: &str) -> CdistObject {
        CdistObject::new(name.parse().unwrap(), Vec::new())
    }

    fn remote() -> Remote {
        Remote::new("web1", "ssh", "scp").unwrap()
    }

    #[test]
    fn missing_gencode_script_generates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let runner = Rc::new(MockRunner::new());
        let code = ShellCode::new(runner.clone(), remote());
        assert!(code.run_gencode_local(&ctx, &object("__pkg/vim")).unwrap().is_empty());
        assert!(runner.invocations().is_empty());
    }

    #[test]
    fn non_empty_output_is_written_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let t = ctx.cdist_type("__file");
        std::fs::create_dir_all(t.path()).unwrap();
        std::fs::write(t.gencode_remote_path(), "echo \"touch /$__object_id\"\n").unwrap();

        let code = ShellCode::new(Rc::new(ShellRunner::new()), remote());
        let obj = object("__file/etc/motd");
        let out = code.run_gencode_remote(&ctx, &obj).unwrap();
        assert_eq!(out, b"touch /etc/motd\n");

        let path = ctx.local.code_remote_path(&obj.name);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "#!/bin/sh -e\ntouch /etc/motd\n"
        );
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn empty_output_leaves_no_code_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let t = ctx.cdist_type("__file");
        std::fs::create_dir_all(t.path()).unwrap();
        std::fs::write(t.gencode_local_path(), "true\n").unwrap();

        let obj = object("__file/etc/motd");
        let stale = ctx.local.code_local_path(&obj.name);
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        let code = ShellCode::new(Rc::new(ShellRunner::new()), remote());
        assert!(code.run_gencode_local(&ctx, &obj).unwrap().is_empty());
        assert!(!stale.exists());
    }

    #[test]
    fn header_only_output_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let t = ctx.cdist_type("__file");
        std::fs::create_dir_all(t.path()).unwrap();
        std::fs::write(t.gencode_remote_path(), "echo '#!/bin/sh -e'\n").unwrap();

        let obj = object("__file/motd");
        let code = ShellCode::new(Rc::new(ShellRunner::new()), remote());
        assert!(code.run_gencode_remote(&ctx, &obj).unwrap().is_empty());
        assert!(!ctx.local.code_remote_path(&obj.name).exists());
    }

    #[test]
    fn failing_gencode_is_codegen_failed() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let t = ctx.cdist_type("__file");
        std::fs::create_dir_all(t.path()).unwrap();
        std::fs::write(t.gencode_local_path(), "exit 2\n").unwrap();

        let code = ShellCode::new(Rc::new(ShellRunner::new()), remote());
        let err = code.run_gencode_local(&ctx, &object("__file/x")).unwrap_err();
        assert!(matches!(err, CdistError::CodeGenFailed { .. }));
    }

    #[test]
    fn local_code_runs_in_object_env() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let t = ctx.cdist_type("__file");
        std::fs::create_dir_all(t.path()).unwrap();
        let marker = dir.path().join("ran");
        std::fs::write(
            t.gencode_local_path(),
            format!("echo \"echo \\$__object_id > {}\"\n", marker.display()),
        )
        .unwrap();

        let code = ShellCode::new(Rc::new(ShellRunner::new()), remote());
        let obj = object("__file/motd");
        code.run_gencode_local(&ctx, &obj).unwrap();
        code.run_code_local(&ctx, &obj).unwrap();
        assert_eq!(std::fs::read_to_string(marker).unwrap(), "motd\n");
    }

    #[test]
    fn remote_code_is_copied_then_executed() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let runner = Rc::new(MockRunner::new());
        let code = ShellCode::new(runner.clone(), remote());
        let obj = object("__file/motd");

        code.transfer_code_remote(&ctx, &obj).unwrap();
        code.run_code_remote(&ctx, &obj).unwrap();

        let lines = runner.command_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("mkdir -p /var/lib/cdist/object/__file/motd/.cdist"));
        assert!(lines[1].starts_with("scp "));
        assert!(lines[1].ends_with("web1:/var/lib/cdist/object/__file/motd/.cdist/code-remote"));
        assert!(lines[2].contains("/bin/sh -e /var/lib/cdist/object/__file/motd/.cdist/code-remote"));
    }

    #[test]
    fn failing_remote_code_is_exec_failed() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let runner = Rc::new(MockRunner::with_responses(vec![Err("denied")]));
        let code = ShellCode::new(runner, remote());
        match code.run_code_remote(&ctx, &object("__file/motd")) {
            Err(CdistError::CodeExecFailed { side, message, .. }) => {
                assert_eq!(side, "remote");
                assert!(message.contains("denied"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
