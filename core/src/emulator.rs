//! Object emulator.
//!
//! Manifests declare objects by running type names as commands:
//!
//! ```text
//! __file /etc/motd --source /srv/motd --mode 0644
//! require="__pkg/foo" __file /etc/issue
//! ```
//!
//! Each type in `out/bin` is a link to the cdist binary. Invoked under such
//! a name, it records the object in the object tree below `$__global` and
//! exits; the manifest gateway picks it up after the manifest finishes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::context::Env;
use crate::data::layout;
use crate::error::{CdistError, Result};
use crate::types::object::ObjectName;

/// Object id used for types marked `singleton`.
pub const SINGLETON_ID: &str = "singleton";


/// True when `argv0` names a type rather than the cdist binary itself.
pub fn is_emulator_name(argv0: &str) -> bool {
    Path::new(argv0)
        .file_name()
        .map(|n| n.to_string_lossy().starts_with("__"))
        .unwrap_or(false)
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emulator {
    pub object: ObjectName,
    pub parameters: BTreeMap<String, String>,
    pub requirements: Vec<ObjectName>,
    object_root: PathBuf,
}


impl Emulator {
    /// Parse an emulator invocation. `args[0]` is the type name (as a path
    /// or bare); `env` must carry `__global`.
    pub fn from_args(args: &[String], env: &Env) -> Result<Self> {
        let argv0 = args
            .first()
            .ok_or_else(|| CdistError::Emulator("no type name".into()))?;
        let type_name = Path::new(argv0)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CdistError::Emulator(format!("cannot derive type from '{}'", argv0)))?;

        let global = env
            .get("__global")
            .ok_or_else(|| CdistError::Emulator("__global is not set; not run from a manifest?".into()))?;

        let mut object_id: Option<String> = None;
        let mut parameters = BTreeMap::new();
        let mut rest = args[1..].iter();
        while let Some(arg) = rest.next() {
            if let Some(key) = arg.strip_prefix("--") {
                if key.is_empty() {
                    return Err(CdistError::Emulator(format!("{}: empty parameter name", type_name)));
                }
                let value = rest.next().ok_or_else(|| {
                    CdistError::Emulator(format!("{}: parameter --{} needs a value", type_name, key))
                })?;
                if parameters.insert(key.to_string(), value.clone()).is_some() {
                    return Err(CdistError::Emulator(format!(
                        "{}: parameter --{} given twice",
                        type_name, key
                    )));
                }
            } else if object_id.is_none() {
                object_id = Some(arg.clone());
            } else {
                return Err(CdistError::Emulator(format!(
                    "{}: unexpected argument '{}'",
                    type_name, arg
                )));
            }
        }

        let object_id = match object_id {
            Some(id) => id,
            None if is_singleton(env, &type_name) => SINGLETON_ID.to_string(),
            None => {
                return Err(CdistError::Emulator(format!(
                    "{}: missing object id",
                    type_name
                )))
            }
        };

        let requirements = env
            .get("require")
            .map(|r| r.split_whitespace().map(str::parse).collect::<Result<Vec<ObjectName>>>())
            .transpose()?
            .unwrap_or_default();

        Ok(Emulator {
            object: ObjectName::new(&type_name, &object_id)?,
            parameters,
            requirements,
            object_root: PathBuf::from(global).join("object"),
        })
    }

    /// Write the object into the tree. Re-declaring an object with the same
    /// parameters is accepted and merges requirements; different
    /// parameters are a duplicate.
    pub fn record(&self) -> Result<ObjectName> {
        let meta = layout::meta_dir(&self.object_root, &self.object);
        let parameter_dir = meta.join(layout::PARAMETER_DIR);
        let require_path = meta.join(layout::REQUIRE_FILE);

        if meta.is_dir() {
            let existing = read_parameters(&parameter_dir)?;
            if existing != self.parameters {
                return Err(CdistError::DuplicateObject {
                    name: self.object.to_string(),
                });
            }
            let mut require = layout::read_lines(&require_path)?;
            for r in &self.requirements {
                let r = r.to_string();
                if !require.contains(&r) {
                    require.push(r);
                }
            }
            layout::write_lines(&require_path, &require)?;
            debug!(object = %self.object, "object redeclared");
            return Ok(self.object.clone());
        }

        std::fs::create_dir_all(&parameter_dir).map_err(|e| CdistError::io(&parameter_dir, e))?;
        for (key, value) in &self.parameters {
            let path = parameter_dir.join(key);
            std::fs::write(&path, format!("{}\n", value)).map_err(|e| CdistError::io(&path, e))?;
        }
        let require: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        layout::write_lines(&require_path, &require)?;
        debug!(object = %self.object, "object recorded");
        Ok(self.object.clone())
    }
}


fn is_singleton(env: &Env, type_name: &str) -> bool {
    env.get("__cdist_type_base_path")
        .map(|base| Path::new(base).join(type_name).join("singleton").exists())
        .unwrap_or(false)
}


fn read_parameters(dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut parameters = BTreeMap::new();
    for name in crate::types::cdist_type::list_file_names(dir)? {
        let path = dir.join(&name);
        let value = std::fs::read_to_string(&path).map_err(|e| CdistError::io(&path, e))?;
        parameters.insert(name, value.strip_suffix('\n').unwrap_or(&value).to_string());
    }
    Ok(parameters)
}
