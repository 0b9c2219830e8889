//! Staged scheduler: prepare everything, then run in static order.
//!
//! Requirements are ignored while preparing; the prepare stage repeats
//! until a round creates no new object. The run stage then orders the now
//! complete graph once, so a cycle fails before any code is generated.

use tracing::{debug, info};

use super::report::RunReport;
use super::resolver::DependencyResolver;
use super::steps::ObjectSteps;
use super::{OrderingPolicy, Strategy};
use crate::data::ObjectStore;
use crate::error::Result;
use crate::types::object::ObjectState;


#[derive(Debug, Clone, Copy, Default)]
pub struct StagedScheduler;


impl StagedScheduler {
    fn stage_prepare(&self, store: &mut ObjectStore, steps: &ObjectSteps<'_>, report: &mut RunReport) -> Result<()> {
        loop {
            report.passes += 1;
            let pending: Vec<_> = store
                .names()
                .into_iter()
                .filter(|n| store.state(n) == Some(ObjectState::Undefined))
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            debug!(round = report.passes, objects = pending.len(), "prepare round");
            for name in pending {
                steps.prepare(store, &name)?;
                report.prepared.push(name.to_string());
            }
        }
    }

    fn stage_run(&self, store: &mut ObjectStore, steps: &ObjectSteps<'_>, report: &mut RunReport) -> Result<()> {
        let resolver = DependencyResolver::new(store)?;
        for name in resolver {
            if steps.run(store, &name)? {
                report.changed.push(name.to_string());
            }
            report.ran.push(name.to_string());
        }
        Ok(())
    }
}


impl OrderingPolicy for StagedScheduler {
    fn strategy(&self) -> Strategy {
        Strategy::Staged
    }

    fn converge(&self, store: &mut ObjectStore, steps: &ObjectSteps<'_>) -> Result<RunReport> {
        let mut report = RunReport::new(&steps.ctx.target_host, Strategy::Staged, steps.ctx.dry_run);
        self.stage_prepare(store, steps, &mut report)?;
        self.stage_run(store, steps, &mut report)?;
        info!(objects = store.len(), "converged");
        Ok(report)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::testing::{ctx, gateways, spec};
    use crate::error::CdistError;
    use crate::gateway::MockHost;

    #[test]
    fn prepares_everything_before_running_anything() {
        let host = MockHost::new()
            .manifest("__app/web", vec![spec("__pkg/nginx", &[])])
            .code_local("__pkg/nginx", "install");
        let (host, gw) = gateways(host);
        let ctx = ctx();
        let steps = ObjectSteps::new(&ctx, &gw);
        let mut store = ObjectStore::in_memory();
        store
            .register_all(vec![spec("__app/web", &[]), spec("__file/motd", &["__app/web"])])
            .unwrap();

        let report = StagedScheduler.converge(&mut store, &steps).unwrap();
        assert_eq!(report.prepared, vec!["__app/web", "__file/motd", "__pkg/nginx"]);
        assert_eq!(report.ran, vec!["__pkg/nginx", "__app/web", "__file/motd"]);
        assert_eq!(report.changed, vec!["__pkg/nginx"]);

        let events = host.events();
        let last_manifest = events.iter().rposition(|e| e.starts_with("manifest")).unwrap();
        let first_gencode = events.iter().position(|e| e.starts_with("gencode")).unwrap();
        assert!(last_manifest < first_gencode);
        assert!(store.unfinished().is_empty());
    }

    #[test]
    fn cycle_fails_before_any_code_runs() {
        let (host, gw) = gateways(MockHost::new().code_local("__x/a", "true"));
        let ctx = ctx();
        let steps = ObjectSteps::new(&ctx, &gw);
        let mut store = ObjectStore::in_memory();
        store
            .register_all(vec![spec("__x/a", &["__x/b"]), spec("__x/b", &["__x/a"])])
            .unwrap();

        let err = StagedScheduler.converge(&mut store, &steps).unwrap_err();
        assert!(matches!(err, CdistError::CyclicDependency { .. }));
        assert!(host.events_of("gencode-local").is_empty());
        assert!(host.events_of("code-local").is_empty());
    }
}
