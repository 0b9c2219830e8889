//! Scripted stand-in for a whole target host.
//!
//! `MockHost` answers every gateway call from tables set up front and logs
//! each call as a short event line (`"code-local __file/x"`), so tests can
//! assert on what ran and in which order.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

use super::{CodeGateway, ExplorerGateway, ManifestGateway, RemoteWorkspace};
use crate::context::RunContext;
use crate::error::{CdistError, Result};
use crate::types::object::{CdistObject, Declarations, ObjectSpec};


#[derive(Debug, Default)]
pub struct MockHost {
    initial: Vec<ObjectSpec>,
    manifests: BTreeMap<String, Declarations>,
    code_local: BTreeMap<String, String>,
    code_remote: BTreeMap<String, String>,
    explorers: BTreeMap<String, BTreeMap<String, String>>,
    global_explorers: BTreeMap<String, String>,
    failures: BTreeMap<String, String>,
    events: RefCell<Vec<String>>,
}


impl MockHost {
    pub fn new() -> Self {
        MockHost::default()
    }

    /// Objects the initial manifest declares.
    pub fn initial(mut self, specs: Vec<ObjectSpec>) -> Self {
        self.initial = specs;
        self
    }

    /// Objects `object`'s type manifest declares.
    pub fn manifest(mut self, object: &str, specs: Vec<ObjectSpec>) -> Self {
        self.manifests.entry(object.to_string()).or_default().objects = specs;
        self
    }

    /// Requirements `object`'s type manifest adds to an existing object.
    pub fn requirement_update(mut self, object: &str, update: ObjectSpec) -> Self {
        self.manifests
            .entry(object.to_string())
            .or_default()
            .requirement_updates
            .push(update);
        self
    }

    pub fn code_local(mut self, object: &str, code: &str) -> Self {
        self.code_local.insert(object.to_string(), code.to_string());
        self
    }

    pub fn code_remote(mut self, object: &str, code: &str) -> Self {
        self.code_remote.insert(object.to_string(), code.to_string());
        self
    }

    pub fn explorer(mut self, object: &str, name: &str, output: &str) -> Self {
        self.explorers
            .entry(object.to_string())
            .or_default()
            .insert(name.to_string(), output.to_string());
        self
    }

    pub fn global_explorer(mut self, name: &str, output: &str) -> Self {
        self.global_explorers.insert(name.to_string(), output.to_string());
        self
    }

    /// Make the call logged as `event` fail with `message`.
    pub fn fail_on(mut self, event: &str, message: &str) -> Self {
        self.failures.insert(event.to_string(), message.to_string());
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    /// Events whose verb is `verb`, e.g. every `"code-remote ..."`.
    pub fn events_of(&self, verb: &str) -> Vec<String> {
        let prefix = format!("{} ", verb);
        self.events
            .borrow()
            .iter()
            .filter(|e| e.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn log(&self, event: String) -> std::result::Result<(), String> {
        let failure = self.failures.get(&event).cloned();
        self.events.borrow_mut().push(event);
        match failure {
            Some(message) => Err(message),
            None => Ok(()),
        }
    }

    fn log_object(&self, verb: &str, object: &CdistObject) -> std::result::Result<(), String> {
        self.log(format!("{} {}", verb, object.name))
    }
}


impl ExplorerGateway for MockHost {
    fn run_global_explorers(&self, _ctx: &RunContext, output_dir: &Path) -> Result<()> {
        self.log("global-explorers".into())
            .map_err(|message| CdistError::ExplorerFailed {
                name: "global".into(),
                message,
            })?;
        if self.global_explorers.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(output_dir).map_err(|e| CdistError::io(output_dir, e))?;
        for (name, output) in &self.global_explorers {
            let path = output_dir.join(name);
            std::fs::write(&path, output).map_err(|e| CdistError::io(&path, e))?;
        }
        Ok(())
    }

    fn run_type_explorers(
        &self,
        _ctx: &RunContext,
        object: &CdistObject,
    ) -> Result<BTreeMap<String, String>> {
        self.log_object("explore", object)
            .map_err(|message| CdistError::ExplorerFailed {
                name: object.name.to_string(),
                message,
            })?;
        Ok(self.explorers.get(&object.name.to_string()).cloned().unwrap_or_default())
    }
}


impl ManifestGateway for MockHost {
    fn run_initial_manifest(&self, _ctx: &RunContext, path: &Path) -> Result<Declarations> {
        self.log("initial-manifest".into())
            .map_err(|message| CdistError::ManifestFailed {
                path: path.to_path_buf(),
                message,
            })?;
        Ok(Declarations::of(self.initial.clone()))
    }

    fn run_type_manifest(&self, ctx: &RunContext, object: &CdistObject) -> Result<Declarations> {
        self.log_object("manifest", object)
            .map_err(|message| CdistError::ManifestFailed {
                path: ctx.cdist_type(object.type_name()).manifest_path(),
                message,
            })?;
        Ok(self.manifests.get(&object.name.to_string()).cloned().unwrap_or_default())
    }
}


impl CodeGateway for MockHost {
    fn run_gencode_local(&self, ctx: &RunContext, object: &CdistObject) -> Result<Vec<u8>> {
        self.log_object("gencode-local", object)
            .map_err(|message| CdistError::CodeGenFailed {
                object: object.name.to_string(),
                script: ctx.cdist_type(object.type_name()).gencode_local_path(),
                message,
            })?;
        Ok(self
            .code_local
            .get(&object.name.to_string())
            .map(|c| c.as_bytes().to_vec())
            .unwrap_or_default())
    }

    fn run_gencode_remote(&self, ctx: &RunContext, object: &CdistObject) -> Result<Vec<u8>> {
        self.log_object("gencode-remote", object)
            .map_err(|message| CdistError::CodeGenFailed {
                object: object.name.to_string(),
                script: ctx.cdist_type(object.type_name()).gencode_remote_path(),
                message,
            })?;
        Ok(self
            .code_remote
            .get(&object.name.to_string())
            .map(|c| c.as_bytes().to_vec())
            .unwrap_or_default())
    }

    fn run_code_local(&self, _ctx: &RunContext, object: &CdistObject) -> Result<()> {
        self.log_object("code-local", object)
            .map_err(|message| CdistError::CodeExecFailed {
                object: object.name.to_string(),
                side: "local",
                message,
            })
    }

    fn transfer_code_remote(&self, _ctx: &RunContext, object: &CdistObject) -> Result<()> {
        self.log_object("transfer", object)
            .map_err(|message| CdistError::CodeExecFailed {
                object: object.name.to_string(),
                side: "remote",
                message,
            })
    }

    fn run_code_remote(&self, _ctx: &RunContext, object: &CdistObject) -> Result<()> {
        self.log_object("code-remote", object)
            .map_err(|message| CdistError::CodeExecFailed {
                object: object.name.to_string(),
                side: "remote",
                message,
            })
    }
}


impl RemoteWorkspace for MockHost {
    fn reset(&self, ctx: &RunContext) -> Result<()> {
        self.log("reset".into()).map_err(|message| CdistError::Remote {
            host: ctx.target_host.clone(),
            message,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::config::Settings;
    use crate::types::object::ObjectName;

    fn parse(name: &str) -> ObjectName {
        name.parse().unwrap()
    }

    fn ctx() -> RunContext {
        RunContext::new("web1", Path::new("/tmp/run"), &Settings::default())
    }

    #[test]
    fn answers_from_tables_and_logs_calls() {
        let host = MockHost::new()
            .manifest("__app/web", vec![ObjectSpec::new(parse("__pkg/nginx"))])
            .code_remote("__pkg/nginx", "apt-get install nginx");
        let app = CdistObject::new(parse("__app/web"), Vec::new());
        let nginx = CdistObject::new(parse("__pkg/nginx"), Vec::new());

        let declared = host.run_type_manifest(&ctx(), &app).unwrap();
        assert_eq!(declared.objects[0].name, parse("__pkg/nginx"));
        assert!(host.run_gencode_local(&ctx(), &nginx).unwrap().is_empty());
        assert_eq!(
            host.run_gencode_remote(&ctx(), &nginx).unwrap(),
            b"apt-get install nginx"
        );
        assert_eq!(
            host.events(),
            vec![
                "manifest __app/web",
                "gencode-local __pkg/nginx",
                "gencode-remote __pkg/nginx"
            ]
        );
    }

    #[test]
    fn injected_failure_maps_to_gateway_error() {
        let host = MockHost::new().fail_on("code-local __file/x", "boom");
        let obj = CdistObject::new(parse("__file/x"), Vec::new());
        let err = host.run_code_local(&ctx(), &obj).unwrap_err();
        assert!(matches!(err, CdistError::CodeExecFailed { side: "local", .. }));
        assert_eq!(host.events_of("code-local"), vec!["code-local __file/x"]);
    }
}
