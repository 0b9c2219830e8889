//! The two object transitions: prepare (undefined → prepared) and
//! run (prepared → done).
//!
//! Gateways produce output; only these steps write to the store.

use tracing::info;

use crate::context::RunContext;
use crate::data::ObjectStore;
use crate::error::{CdistError, Result};
use crate::gateway::Gateways;
use crate::types::object::{ObjectName, ObjectState};


pub struct ObjectSteps<'a> {
    pub ctx: &'a RunContext,
    pub gateways: &'a Gateways,
}


impl<'a> ObjectSteps<'a> {
    pub fn new(ctx: &'a RunContext, gateways: &'a Gateways) -> Self {
        ObjectSteps { ctx, gateways }
    }

    /// Run the type explorers and the type manifest of `name`. Objects the
    /// manifest declares are registered and become autorequirements;
    /// requirements it adds to known objects are merged into them.
    /// Returns the newly registered names.
    pub fn prepare(&self, store: &mut ObjectStore, name: &ObjectName) -> Result<Vec<ObjectName>> {
        let object = store.get(name)?.clone();
        info!(object = %name, "preparing");

        let explored = self.gateways.explorer.run_type_explorers(self.ctx, &object)?;
        store.record_explorers(name, &explored)?;

        let declared = self.gateways.manifest.run_type_manifest(self.ctx, &object)?;
        let created = store.register_declarations(declared)?;
        store.add_autorequire(name, &created)?;
        store.set_state(name, ObjectState::Prepared)?;
        Ok(created)
    }

    /// Generate and execute the code of `name`. Returns whether any code
    /// was generated.
    pub fn run(&self, store: &mut ObjectStore, name: &ObjectName) -> Result<bool> {
        let object = store.get(name)?.clone();
        match object.state {
            ObjectState::Prepared => {}
            ObjectState::Done => {
                return Err(CdistError::AlreadyDone {
                    name: name.to_string(),
                })
            }
            from => {
                return Err(CdistError::InvalidTransition {
                    name: name.to_string(),
                    from,
                    to: ObjectState::Done,
                })
            }
        }
        info!(object = %name, "running");

        let code = &self.gateways.code;
        let local = !code.run_gencode_local(self.ctx, &object)?.is_empty();
        let remote = !code.run_gencode_remote(self.ctx, &object)?.is_empty();
        store.record_code(name, local, remote)?;

        if self.ctx.dry_run {
            if local || remote {
                info!(object = %name, local, remote, "dry run, not executing code");
            }
        } else {
            if local {
                code.run_code_local(self.ctx, &object)?;
            }
            if remote {
                code.transfer_code_remote(self.ctx, &object)?;
                code.run_code_remote(self.ctx, &object)?;
            }
        }

        store.set_state(name, ObjectState::Done)?;
        Ok(local || remote)
    }
}
