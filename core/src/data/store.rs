//! Object store: the arena of every object known to the current run.
//!
//! Objects are keyed by their canonical name and iterated in name order.
//! When opened on a directory, every mutation is written through to the
//! object tree (see `layout`), so a failed run leaves an inspectable record.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::layout;
use crate::error::{CdistError, Result};
use crate::types::object::{CdistObject, Declarations, ObjectName, ObjectSpec, ObjectState};


#[derive(Debug, Default)]
pub struct ObjectStore {
    root: Option<PathBuf>,
    objects: BTreeMap<ObjectName, CdistObject>,
}


impl ObjectStore {
    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        ObjectStore::default()
    }

    /// Open (creating if needed) the object tree at `root`, loading any
    /// objects already recorded there.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| CdistError::io(root, e))?;
        let mut objects = BTreeMap::new();
        for name in layout::scan_objects(root)? {
            let object = layout::read_object(root, &name)?;
            objects.insert(name, object);
        }
        Ok(ObjectStore {
            root: Some(root.to_path_buf()),
            objects,
        })
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, name: &ObjectName) -> bool {
        self.objects.contains_key(name)
    }

    /// Every known object, in name order.
    pub fn list_objects(&self) -> impl Iterator<Item = &CdistObject> {
        self.objects.values()
    }

    /// Names of every known object at this instant. Objects registered
    /// afterwards are not included.
    pub fn names(&self) -> Vec<ObjectName> {
        self.objects.keys().cloned().collect()
    }

    pub fn get(&self, name: &ObjectName) -> Result<&CdistObject> {
        self.objects.get(name).ok_or_else(|| CdistError::ObjectNotFound {
            name: name.to_string(),
        })
    }

    pub fn state(&self, name: &ObjectName) -> Option<ObjectState> {
        self.objects.get(name).map(|o| o.state)
    }

    /// Register a new object in state `undefined`.
    pub fn create(
        &mut self,
        name: ObjectName,
        requirements: Vec<ObjectName>,
    ) -> Result<&CdistObject> {
        if self.objects.contains_key(&name) {
            return Err(CdistError::DuplicateObject {
                name: name.to_string(),
            });
        }
        let object = CdistObject::new(name.clone(), requirements);
        self.persist(&object)?;
        debug!(object = %name, "registered object");
        Ok(self.objects.entry(name).or_insert(object))
    }

    /// Register a batch of manifest-declared objects. The whole batch is
    /// checked first: on a duplicate nothing is registered.
    pub fn register_all(&mut self, specs: Vec<ObjectSpec>) -> Result<Vec<ObjectName>> {
        let mut seen = std::collections::BTreeSet::new();
        for spec in &specs {
            if self.objects.contains_key(&spec.name) || !seen.insert(&spec.name) {
                return Err(CdistError::DuplicateObject {
                    name: spec.name.to_string(),
                });
            }
        }
        let mut names = Vec::with_capacity(specs.len());
        for spec in specs {
            names.push(spec.name.clone());
            self.create(spec.name, spec.requirements)?;
        }
        Ok(names)
    }

    /// Register the new objects of a manifest run and merge its
    /// requirement updates into objects already known. Fails before any
    /// change if an object is a duplicate or an update names an unknown
    /// object.
    pub fn register_declarations(&mut self, declarations: Declarations) -> Result<Vec<ObjectName>> {
        for update in &declarations.requirement_updates {
            let declared_now = declarations.objects.iter().any(|s| s.name == update.name);
            if !self.contains(&update.name) && !declared_now {
                return Err(CdistError::ObjectNotFound {
                    name: update.name.to_string(),
                });
            }
        }
        let created = self.register_all(declarations.objects)?;
        for update in &declarations.requirement_updates {
            self.add_requirements(&update.name, &update.requirements)?;
        }
        Ok(created)
    }

    /// Append user requirements, skipping ones already present.
    pub fn add_requirements(&mut self, name: &ObjectName, deps: &[ObjectName]) -> Result<()> {
        let object = self.get_mut(name)?;
        let mut added = Vec::new();
        for dep in deps {
            if dep != name && !object.requirements.contains(dep) {
                object.requirements.push(dep.clone());
                added.push(dep.to_string());
            }
        }
        if added.is_empty() {
            return Ok(());
        }
        debug!(object = %name, requirements = ?added, "requirements added");
        self.persist_named(name)
    }

    /// Advance an object exactly one step along undefined → prepared → done.
    pub fn set_state(&mut self, name: &ObjectName, next: ObjectState) -> Result<()> {
        let object = self.get_mut(name)?;
        if !object.state.can_advance_to(next) {
            if object.state == ObjectState::Done {
                return Err(CdistError::AlreadyDone {
                    name: name.to_string(),
                });
            }
            return Err(CdistError::InvalidTransition {
                name: name.to_string(),
                from: object.state,
                to: next,
            });
        }
        object.state = next;
        self.persist_named(name)
    }

    /// Append autorequire references, skipping ones already present.
    pub fn add_autorequire(&mut self, name: &ObjectName, deps: &[ObjectName]) -> Result<()> {
        let object = self.get_mut(name)?;
        for dep in deps {
            if dep != name && !object.autorequire.contains(dep) {
                object.autorequire.push(dep.clone());
            }
        }
        self.persist_named(name)
    }

    /// Record which generated code artifacts exist. Any code marks the
    /// object changed.
    pub fn record_code(&mut self, name: &ObjectName, local: bool, remote: bool) -> Result<()> {
        let object = self.get_mut(name)?;
        object.code_local = local;
        object.code_remote = remote;
        if local || remote {
            object.changed = true;
        }
        self.persist_named(name)
    }

    /// Store type explorer output below the object's metadata directory.
    pub fn record_explorers(
        &mut self,
        name: &ObjectName,
        output: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.get(name)?;
        let Some(root) = &self.root else {
            return Ok(());
        };
        let dir = layout::meta_dir(root, name).join(layout::EXPLORER_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| CdistError::io(&dir, e))?;
        for (explorer, value) in output {
            let path = dir.join(explorer);
            std::fs::write(&path, value).map_err(|e| CdistError::io(&path, e))?;
        }
        Ok(())
    }

    /// Names of objects that have not reached `done`, in name order.
    pub fn unfinished(&self) -> Vec<String> {
        self.objects
            .values()
            .filter(|o| !o.is_done())
            .map(|o| o.name.to_string())
            .collect()
    }

    fn get_mut(&mut self, name: &ObjectName) -> Result<&mut CdistObject> {
        self.objects.get_mut(name).ok_or_else(|| CdistError::ObjectNotFound {
            name: name.to_string(),
        })
    }

    fn persist_named(&self, name: &ObjectName) -> Result<()> {
        self.persist(self.get(name)?)
    }

    fn persist(&self, object: &CdistObject) -> Result<()> {
        match &self.root {
            Some(root) => layout::write_object(root, object),
            None => Ok(()),
        }
    }
}
