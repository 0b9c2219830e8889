//! Shell manifest gateway.
//!
//! Manifests declare objects by calling the emulator links in `out/bin`,
//! which record them in the object tree. After each script the tree is
//! scanned again: objects that appeared are returned as new, and `require`
//! entries added to objects that already existed are returned as updates.

use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, info};

use super::ManifestGateway;
use crate::context::{Env, RunContext};
use crate::data::layout;
use crate::error::{CdistError, Result};
use crate::infrastructure::{script_error, CommandRunner, Invocation};
use crate::types::object::{CdistObject, Declarations, ObjectName, ObjectSpec};


pub struct ShellManifest {
    runner: Rc<dyn CommandRunner>,
}


impl ShellManifest {
    pub fn new(runner: Rc<dyn CommandRunner>) -> Self {
        ShellManifest { runner }
    }

    fn run_manifest(&self, ctx: &RunContext, path: &Path, env: Env) -> Result<Declarations> {
        let object_root = &ctx.local.object_path;
        let mut before = BTreeMap::new();
        for name in layout::scan_objects(object_root)? {
            let require = read_requirements(object_root, &name)?;
            before.insert(name, require);
        }

        debug!(manifest = %path.display(), "running manifest");
        self.runner
            .run(&Invocation::script(path).envs(env))
            .map_err(|e| {
                script_error(e, |message| CdistError::ManifestFailed {
                    path: path.to_path_buf(),
                    message,
                })
            })?;

        let mut declared = Declarations::default();
        for name in layout::scan_objects(object_root)? {
            let requirements = read_requirements(object_root, &name)?;
            match before.get(&name) {
                None => declared.objects.push(ObjectSpec { name, requirements }),
                Some(known) => {
                    let added: Vec<ObjectName> =
                        requirements.into_iter().filter(|r| !known.contains(r)).collect();
                    if !added.is_empty() {
                        declared.requirement_updates.push(ObjectSpec {
                            name,
                            requirements: added,
                        });
                    }
                }
            }
        }
        Ok(declared)
    }
}


fn read_requirements(object_root: &Path, name: &ObjectName) -> Result<Vec<ObjectName>> {
    layout::read_lines(&layout::meta_dir(object_root, name).join(layout::REQUIRE_FILE))?
        .iter()
        .map(|r| r.parse())
        .collect()
}


impl ManifestGateway for ShellManifest {
    fn run_initial_manifest(&self, ctx: &RunContext, path: &Path) -> Result<Declarations> {
        if !path.is_file() {
            return Err(CdistError::ManifestFailed {
                path: path.to_path_buf(),
                message: "initial manifest does not exist".into(),
            });
        }
        info!(manifest = %path.display(), "running initial manifest");
        self.run_manifest(ctx, path, ctx.manifest_env(path))
    }

    fn run_type_manifest(&self, ctx: &RunContext, object: &CdistObject) -> Result<Declarations> {
        let manifest = ctx.cdist_type(object.type_name()).manifest_path();
        if !manifest.is_file() {
            return Ok(Declarations::default());
        }
        self.run_manifest(ctx, &manifest, ctx.type_manifest_env(object, &manifest))
    }
}
