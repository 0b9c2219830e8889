//! Remote working tree reset.

use std::rc::Rc;

use tracing::debug;

use super::RemoteWorkspace;
use crate::context::RunContext;
use crate::error::{CdistError, Result};
use crate::infrastructure::{CommandRunner, Remote};


pub struct ShellWorkspace {
    runner: Rc<dyn CommandRunner>,
    remote: Remote,
}


impl ShellWorkspace {
    pub fn new(runner: Rc<dyn CommandRunner>, remote: Remote) -> Self {
        ShellWorkspace { runner, remote }
    }
}


impl RemoteWorkspace for ShellWorkspace {
    fn reset(&self, ctx: &RunContext) -> Result<()> {
        debug!(base = %ctx.remote.base_path.display(), "resetting remote workspace");
        let steps = [
            self.remote.rmdir(&ctx.remote.base_path),
            self.remote.mkdir(&ctx.remote.base_path),
            self.remote.mkdir(&ctx.remote.conf_path),
        ];
        for step in &steps {
            self.runner.run(step).map_err(|e| CdistError::Remote {
                host: ctx.target_host.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MockRunner;
    use crate::types::config::Settings;
    use std::path::Path;

    fn ctx() -> RunContext {
        RunContext::new("web1", Path::new("/tmp/run"), &Settings::default())
    }

    #[test]
    fn reset_removes_then_recreates() {
        let runner = Rc::new(MockRunner::new());
        let ws = ShellWorkspace::new(runner.clone(), Remote::new("web1", "ssh", "scp").unwrap());
        ws.reset(&ctx()).unwrap();
        assert_eq!(
            runner.command_lines(),
            vec![
                "ssh web1 rm -rf /var/lib/cdist",
                "ssh web1 mkdir -p /var/lib/cdist",
                "ssh web1 mkdir -p /var/lib/cdist/conf",
            ]
        );
    }

    #[test]
    fn unreachable_host_is_remote_error() {
        let runner = Rc::new(MockRunner::with_responses(vec![Err("no route to host")]));
        let ws = ShellWorkspace::new(runner.clone(), Remote::new("web1", "ssh", "scp").unwrap());
        let err = ws.reset(&ctx()).unwrap_err();
        assert!(matches!(err, CdistError::Remote { ref host, .. } if host == "web1"));
        assert_eq!(runner.invocations().len(), 1);
    }
}
