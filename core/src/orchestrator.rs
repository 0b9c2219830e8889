//! Run orchestrator: one complete deployment to one host.
//!
//! `run` resets the target, links the emulator, runs the global explorers
//! and the initial manifest, then hands the store to the ordering policy.
//! `cleanup` archives the local working tree under the cache. A failed run
//! is not cleaned up so its tree can be inspected.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::convergence::{ObjectSteps, RunReport, Strategy};
use crate::data::ObjectStore;
use crate::error::{CdistError, Result};
use crate::gateway::Gateways;
use crate::lock::RunLock;
use crate::types::cdist_type::CdistType;


pub struct ConfigInstall {
    ctx: RunContext,
    gateways: Gateways,
    store: ObjectStore,
    strategy: Strategy,
    lock_timeout_ms: u64,
}


impl ConfigInstall {
    /// Create the local working tree and an empty object store in it. A
    /// working tree left behind by an earlier failed run is discarded.
    pub fn new(
        ctx: RunContext,
        gateways: Gateways,
        strategy: Strategy,
        lock_timeout_ms: u64,
    ) -> Result<Self> {
        if ctx.local.out_path.exists() {
            warn!(path = %ctx.local.out_path.display(), "removing working tree of a previous run");
            std::fs::remove_dir_all(&ctx.local.out_path)
                .map_err(|e| CdistError::io(&ctx.local.out_path, e))?;
        }
        for dir in ctx.local.run_dirs() {
            std::fs::create_dir_all(dir).map_err(|e| CdistError::io(dir, e))?;
        }
        let store = ObjectStore::open(&ctx.local.object_path)?;
        Ok(ConfigInstall {
            ctx,
            gateways,
            store,
            strategy,
            lock_timeout_ms,
        })
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Expose every type as a command in `out/bin` so manifests can call it.
    pub fn link_emulator(&self) -> Result<()> {
        let types = CdistType::list_types(&self.ctx.local.type_path)?;
        for cdist_type in &types {
            let link = self.ctx.local.bin_path.join(cdist_type.name());
            if link.symlink_metadata().is_ok() {
                std::fs::remove_file(&link).map_err(|e| CdistError::io(&link, e))?;
            }
            std::os::unix::fs::symlink(&self.ctx.emulator, &link)
                .map_err(|e| CdistError::io(&link, e))?;
        }
        debug!(types = types.len(), emulator = %self.ctx.emulator.display(), "linked emulator");
        Ok(())
    }

    pub fn run(&mut self) -> Result<RunReport> {
        info!(strategy = %self.strategy, dry_run = self.ctx.dry_run, "starting run");
        self.gateways.workspace.reset(&self.ctx)?;
        self.link_emulator()?;

        self.gateways
            .explorer
            .run_global_explorers(&self.ctx, &self.ctx.local.global_explorer_out_path)?;

        let declared = self
            .gateways
            .manifest
            .run_initial_manifest(&self.ctx, &self.ctx.initial_manifest)?;
        let registered = self.store.register_declarations(declared)?;
        info!(objects = registered.len(), "initial manifest declared objects");

        let steps = ObjectSteps::new(&self.ctx, &self.gateways);
        self.strategy.policy().converge(&mut self.store, &steps)
    }

    /// Move the working tree to `<cache>/<host>`, replacing an earlier
    /// archive of the same host.
    pub fn cleanup(&self) -> Result<()> {
        let archive = self.ctx.archive_path();
        if archive.exists() {
            debug!(archive = %archive.display(), "replacing previous archive");
            std::fs::remove_dir_all(&archive).map_err(|e| CdistError::io(&archive, e))?;
        }
        let cache = &self.ctx.local.cache_path;
        std::fs::create_dir_all(cache).map_err(|e| CdistError::io(cache, e))?;

        let out = &self.ctx.local.out_path;
        match std::fs::rename(out, &archive) {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                copy_tree(out, &archive)?;
                std::fs::remove_dir_all(out).map_err(|e| CdistError::io(out, e))?;
            }
            Err(e) => return Err(CdistError::io(out, e)),
        }
        info!(archive = %archive.display(), "archived run");
        Ok(())
    }

    /// `run` then `cleanup`, holding the host's run lock throughout.
    pub fn deploy_and_cleanup(&mut self) -> Result<RunReport> {
        let _lock = RunLock::acquire(&self.ctx.lock_path(), self.lock_timeout_ms)?;
        let start = Instant::now();

        let mut report = self.run()?;
        self.cleanup()?;

        let elapsed = start.elapsed();
        report.elapsed_ms = elapsed.as_millis() as u64;
        info!("Finished successful run in {:.2} seconds", elapsed.as_secs_f64());
        Ok(report)
    }
}


/// Recursive copy, keeping symlinks as symlinks.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to).map_err(|e| CdistError::io(to, e))?;
    for entry in std::fs::read_dir(from).map_err(|e| CdistError::io(from, e))? {
        let entry = entry.map_err(|e| CdistError::io(from, e))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| CdistError::io(&source, e))?;
        if file_type.is_dir() {
            copy_tree(&source, &target)?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(&source).map_err(|e| CdistError::io(&source, e))?;
            std::os::unix::fs::symlink(link, &target).map_err(|e| CdistError::io(&target, e))?;
        } else {
            std::fs::copy(&source, &target).map_err(|e| CdistError::io(&source, e))?;
        }
    }
    Ok(())
}
