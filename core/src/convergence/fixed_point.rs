//! Fixed-point scheduler.
//!
//! Each pass walks the names known when the pass starts. Objects created
//! during a pass are first considered by the next one; state changes made
//! earlier in a pass are visible to objects later in the same pass. The
//! loop ends on the first pass that neither prepares nor runs anything.

use tracing::{debug, info};

use super::dependency::requirements_satisfied;
use super::report::RunReport;
use super::steps::ObjectSteps;
use super::{OrderingPolicy, Strategy};
use crate::data::ObjectStore;
use crate::error::{CdistError, Result};
use crate::types::object::ObjectState;


#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPointScheduler;


impl OrderingPolicy for FixedPointScheduler {
    fn strategy(&self) -> Strategy {
        Strategy::FixedPoint
    }

    fn converge(&self, store: &mut ObjectStore, steps: &ObjectSteps<'_>) -> Result<RunReport> {
        let mut report = RunReport::new(&steps.ctx.target_host, Strategy::FixedPoint, steps.ctx.dry_run);

        loop {
            report.passes += 1;
            let mut changed_this_pass = false;

            for name in store.names() {
                let ready = {
                    let object = store.get(&name)?;
                    requirements_satisfied(store, object, &object.requirements)
                };
                if !ready {
                    continue;
                }

                if store.state(&name) == Some(ObjectState::Undefined) {
                    steps.prepare(store, &name)?;
                    report.prepared.push(name.to_string());
                    changed_this_pass = true;
                }

                // Preparing may have added requirements, so both lists are
                // checked again here.
                let runnable = {
                    let object = store.get(&name)?;
                    object.state == ObjectState::Prepared
                        && requirements_satisfied(store, object, &object.requirements)
                        && requirements_satisfied(store, object, &object.autorequire)
                };
                if runnable {
                    if steps.run(store, &name)? {
                        report.changed.push(name.to_string());
                    }
                    report.ran.push(name.to_string());
                    changed_this_pass = true;
                }
            }

            debug!(pass = report.passes, changed = changed_this_pass, objects = store.len(), "pass finished");
            if !changed_this_pass {
                break;
            }
        }

        let unresolved = store.unfinished();
        if !unresolved.is_empty() {
            return Err(CdistError::UnresolvedObjects(unresolved));
        }
        info!(passes = report.passes, objects = store.len(), "converged");
        Ok(report)
    }
}
