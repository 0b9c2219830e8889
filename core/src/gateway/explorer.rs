//! Shell explorer gateway: copies explorers to the target and runs them there.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, info};

use super::ExplorerGateway;
use crate::context::RunContext;
use crate::data::layout;
use crate::error::{CdistError, Result};
use crate::infrastructure::{script_error, CommandRunner, Invocation, Remote};
use crate::types::cdist_type::list_file_names;
use crate::types::object::CdistObject;


pub struct ShellExplorer {
    runner: Rc<dyn CommandRunner>,
    remote: Remote,
    /// Types whose explorer directory is already on the target.
    transferred_types: RefCell<BTreeSet<String>>,
}


impl ShellExplorer {
    pub fn new(runner: Rc<dyn CommandRunner>, remote: Remote) -> Self {
        ShellExplorer {
            runner,
            remote,
            transferred_types: RefCell::new(BTreeSet::new()),
        }
    }

    fn run(&self, invocation: &Invocation, name: &str) -> Result<Vec<u8>> {
        self.runner.run(invocation).map_err(|e| {
            script_error(e, |message| CdistError::ExplorerFailed {
                name: name.to_string(),
                message,
            })
        })
    }

    fn transfer(&self, source: &Path, destination: &Path, name: &str) -> Result<()> {
        if let Some(parent) = destination.parent() {
            self.run(&self.remote.mkdir(parent), name)?;
        }
        self.run(&self.remote.copy(source, destination), name)?;
        Ok(())
    }

    fn transfer_type_explorers(&self, ctx: &RunContext, object: &CdistObject) -> Result<()> {
        let type_name = object.type_name();
        if self.transferred_types.borrow().contains(type_name) {
            return Ok(());
        }
        let cdist_type = ctx.cdist_type(type_name);
        debug!(type_name, "transferring type explorers");
        self.transfer(
            &cdist_type.explorer_path(),
            &ctx.remote.type_explorer_path(type_name),
            type_name,
        )?;
        self.transferred_types.borrow_mut().insert(type_name.to_string());
        Ok(())
    }

    /// Explorers read `$__object/parameter`, so parameters go along.
    fn transfer_parameters(&self, ctx: &RunContext, object: &CdistObject) -> Result<()> {
        let local = ctx.local.meta_dir(&object.name).join(layout::PARAMETER_DIR);
        if !local.is_dir() {
            return Ok(());
        }
        let remote = ctx.remote.meta_dir(&object.name).join(layout::PARAMETER_DIR);
        self.transfer(&local, &remote, &object.name.to_string())
    }
}


impl ExplorerGateway for ShellExplorer {
    fn run_global_explorers(&self, ctx: &RunContext, output_dir: &Path) -> Result<()> {
        let names = list_file_names(&ctx.local.global_explorer_path)?;
        if names.is_empty() {
            return Ok(());
        }
        info!(count = names.len(), "running global explorers");
        self.transfer(
            &ctx.local.global_explorer_path,
            &ctx.remote.global_explorer_path,
            "global",
        )?;

        std::fs::create_dir_all(output_dir).map_err(|e| CdistError::io(output_dir, e))?;
        let env = ctx.remote_explorer_env(None);
        for name in names {
            let script = ctx.remote.global_explorer_path.join(&name);
            let output = self.run(&self.remote.exec(&[script.display().to_string()], &env), &name)?;
            let path = output_dir.join(&name);
            std::fs::write(&path, output).map_err(|e| CdistError::io(&path, e))?;
        }
        Ok(())
    }

    fn run_type_explorers(
        &self,
        ctx: &RunContext,
        object: &CdistObject,
    ) -> Result<BTreeMap<String, String>> {
        let mut results = BTreeMap::new();
        let names = ctx.cdist_type(object.type_name()).explorers()?;
        if names.is_empty() {
            return Ok(results);
        }
        self.transfer_type_explorers(ctx, object)?;
        self.transfer_parameters(ctx, object)?;

        let env = ctx.remote_explorer_env(Some(object));
        let explorer_dir = ctx.remote.type_explorer_path(object.type_name());
        for name in names {
            debug!(object = %object.name, explorer = %name, "running type explorer");
            let script = explorer_dir.join(&name);
            let output = self.run(
                &self.remote.exec(&[script.display().to_string()], &env),
                &format!("{}:{}", object.name, name),
            )?;
            results.insert(name, String::from_utf8_lossy(&output).into_owned());
        }
        Ok(results)
    }
}
