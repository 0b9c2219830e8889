//! Boundaries to the external collaborators of a run.
//!
//! The core never starts a script itself. It asks an `ExplorerGateway` for
//! facts, a `ManifestGateway` for declared objects and requirements, a `CodeGateway`
//! to generate and execute code, and a `RemoteWorkspace` to reset the
//! target's working tree. Manifest gateways *return* the objects a script
//! declared; registering them is left to the caller, so the store has a
//! single writer.

pub mod code;
pub mod explorer;
pub mod manifest;
pub mod mock;
pub mod workspace;

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use crate::context::RunContext;
use crate::error::Result;
use crate::infrastructure::{CommandRunner, Remote};
use crate::types::object::{CdistObject, Declarations};

pub use code::{ShellCode, CODE_HEADER};
pub use explorer::ShellExplorer;
pub use manifest::ShellManifest;
pub use mock::MockHost;
pub use workspace::ShellWorkspace;

pub trait ExplorerGateway {
    /// Run every global explorer on the target, one output file each in
    /// `output_dir`.
    fn run_global_explorers(&self, ctx: &RunContext, output_dir: &Path) -> Result<()>;

    /// Run the explorers of `object`'s type. Safe to call once per prepare.
    fn run_type_explorers(
        &self,
        ctx: &RunContext,
        object: &CdistObject,
    ) -> Result<BTreeMap<String, String>>;
}

pub trait ManifestGateway {
    /// Run the initial manifest; returns what it declared.
    fn run_initial_manifest(&self, ctx: &RunContext, path: &Path) -> Result<Declarations>;

    /// Run `object`'s type manifest, if the type has one; returns what it
    /// declared.
    fn run_type_manifest(&self, ctx: &RunContext, object: &CdistObject) -> Result<Declarations>;
}

pub trait CodeGateway {
    /// Code to run locally for `object`. Empty means nothing to run.
    fn run_gencode_local(&self, ctx: &RunContext, object: &CdistObject) -> Result<Vec<u8>>;

    /// Code to run on the target for `object`. Empty means nothing to run.
    fn run_gencode_remote(&self, ctx: &RunContext, object: &CdistObject) -> Result<Vec<u8>>;

    fn run_code_local(&self, ctx: &RunContext, object: &CdistObject) -> Result<()>;

    fn transfer_code_remote(&self, ctx: &RunContext, object: &CdistObject) -> Result<()>;

    fn run_code_remote(&self, ctx: &RunContext, object: &CdistObject) -> Result<()>;
}

pub trait RemoteWorkspace {
    /// Remove and recreate the target's working tree.
    fn reset(&self, ctx: &RunContext) -> Result<()>;
}


/// The full set of collaborators one run talks to.
#[derive(Clone)]
pub struct Gateways {
    pub explorer: Rc<dyn ExplorerGateway>,
    pub manifest: Rc<dyn ManifestGateway>,
    pub code: Rc<dyn CodeGateway>,
    pub workspace: Rc<dyn RemoteWorkspace>,
}

impl Gateways {
    /// Shell-backed gateways sharing one runner and one remote.
    pub fn shell(runner: Rc<dyn CommandRunner>, remote: Remote) -> Self {
        Gateways {
            explorer: Rc::new(ShellExplorer::new(runner.clone(), remote.clone())),
            manifest: Rc::new(ShellManifest::new(runner.clone())),
            code: Rc::new(ShellCode::new(runner.clone(), remote.clone())),
            workspace: Rc::new(ShellWorkspace::new(runner, remote)),
        }
    }

    /// One object playing every role, typically a `MockHost`.
    pub fn uniform<T>(host: Rc<T>) -> Self
    where
        T: ExplorerGateway + ManifestGateway + CodeGateway + RemoteWorkspace + 'static,
    {
        Gateways {
            explorer: host.clone(),
            manifest: host.clone(),
            code: host.clone(),
            workspace: host,
        }
    }
}
