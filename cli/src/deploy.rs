//! `cdist config`: deploy one or more hosts, one after the other.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info_span, warn};

use cdist_core::gateway::Gateways;
use cdist_core::infrastructure::{Remote, ShellRunner};
use cdist_core::{ConfigInstall, RunContext, RunReport, Settings, Strategy};


/// Everything a deployment needs besides the host name.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub settings: Settings,
    pub initial_manifest: Option<PathBuf>,
    /// Per-host working trees go below this directory. Without it each host
    /// gets a fresh temporary directory.
    pub base_path: Option<PathBuf>,
    pub debug: bool,
    pub dry_run: bool,
}


/// Result of deploying a list of hosts.
#[derive(Debug, Default)]
pub struct Outcome {
    pub reports: Vec<RunReport>,
    pub failures: Vec<(String, anyhow::Error)>,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}


impl Deployment {
    pub fn strategy(&self) -> Strategy {
        self.settings.strategy
    }

    /// Deploy every host; a failure does not stop the remaining hosts.
    pub fn deploy_all(&self, hosts: &[String]) -> Outcome {
        let mut outcome = Outcome::default();
        for host in hosts {
            match self.deploy_host(host) {
                Ok(report) => outcome.reports.push(report),
                Err(e) => {
                    warn!(target_host = %host, "deployment failed");
                    outcome.failures.push((host.clone(), e));
                }
            }
        }
        outcome
    }

    pub fn deploy_host(&self, host: &str) -> Result<RunReport> {
        let span = info_span!("host", target_host = %host);
        let _enter = span.enter();

        let (base_path, temporary) = match &self.base_path {
            Some(base) => (base.join(host), false),
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("cdist.")
                    .tempdir()
                    .context("cannot create temporary working directory")?;
                (dir.keep(), true)
            }
        };

        let report = self.converge(host, &base_path)?;

        // A failed run keeps its working tree for inspection.
        if temporary {
            std::fs::remove_dir_all(&base_path)
                .with_context(|| format!("cannot remove {}", base_path.display()))?;
        }
        Ok(report)
    }

    fn converge(&self, host: &str, base_path: &Path) -> Result<RunReport> {
        let mut ctx = RunContext::new(host, base_path, &self.settings)
            .with_debug(self.debug)
            .with_dry_run(self.dry_run);
        if let Some(manifest) = &self.initial_manifest {
            ctx = ctx.with_initial_manifest(manifest);
        }

        let timeout = self.settings.script_timeout_secs.map(Duration::from_secs);
        let runner = Rc::new(ShellRunner::with_timeout(timeout));
        let remote = Remote::new(host, &self.settings.remote_exec, &self.settings.remote_copy)?;
        let gateways = Gateways::shell(runner, remote);

        let mut install =
            ConfigInstall::new(ctx, gateways, self.strategy(), self.settings.lock_timeout_ms)?;
        Ok(install.deploy_and_cleanup()?)
    }
}


/// Write the reports of a multi-host run as a JSON array.
pub fn write_reports(path: &Path, reports: &[RunReport]) -> Result<()> {
    let json = serde_json::to_string_pretty(reports).context("cannot serialise run report")?;
    std::fs::write(path, json + "\n").with_context(|| format!("cannot write {}", path.display()))
}
