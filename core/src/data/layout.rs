//! On-disk layout of the object tree.
//!
//! ```text
//! out/object/<type>/<object_id>/.cdist/
//!     state           prepared | done   (absent while undefined)
//!     require         one object name per line
//!     autorequire     one object name per line
//!     changed         marker file
//!     code-local      generated code, only when non-empty
//!     code-remote
//!     explorer/<name> type explorer output
//!     parameter/<name>
//! ```
//!
//! The emulator, the shell manifest gateway and the store all go through
//! these helpers so the format has exactly one definition.

use std::path::{Path, PathBuf};

use crate::error::{CdistError, Result};
use crate::types::object::{CdistObject, ObjectName, ObjectState, OBJECT_MARKER};

pub const STATE_FILE: &str = "state";
pub const REQUIRE_FILE: &str = "require";
pub const AUTOREQUIRE_FILE: &str = "autorequire";
pub const CHANGED_FILE: &str = "changed";
pub const CODE_LOCAL_FILE: &str = "code-local";
pub const CODE_REMOTE_FILE: &str = "code-remote";
pub const EXPLORER_DIR: &str = "explorer";
pub const PARAMETER_DIR: &str = "parameter";


pub fn object_dir(object_root: &Path, name: &ObjectName) -> PathBuf {
    object_root.join(name.type_name()).join(name.object_id())
}


pub fn meta_dir(object_root: &Path, name: &ObjectName) -> PathBuf {
    object_dir(object_root, name).join(OBJECT_MARKER)
}


/// Non-empty trimmed lines of `path`; a missing file reads as empty.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(CdistError::io(path, e)),
    }
}


pub fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<()> {
    let mut content = String::new();
    for line in lines {
        content.push_str(line.as_ref());
        content.push('\n');
    }
    std::fs::write(path, content).map_err(|e| CdistError::io(path, e))
}


fn parse_names(lines: Vec<String>) -> Result<Vec<ObjectName>> {
    lines.iter().map(|l| l.parse()).collect()
}


/// Every object below `object_root`, sorted by name.
pub fn scan_objects(object_root: &Path) -> Result<Vec<ObjectName>> {
    let mut found = Vec::new();
    if !object_root.is_dir() {
        return Ok(found);
    }
    for entry in std::fs::read_dir(object_root).map_err(|e| CdistError::io(object_root, e))? {
        let entry = entry.map_err(|e| CdistError::io(object_root, e))?;
        let type_dir = entry.path();
        if !type_dir.is_dir() {
            continue;
        }
        let type_name = entry.file_name().to_string_lossy().into_owned();
        walk_type_dir(&type_dir, &type_dir, &type_name, &mut found)?;
    }
    found.sort();
    Ok(found)
}


fn walk_type_dir(
    type_dir: &Path,
    dir: &Path,
    type_name: &str,
    found: &mut Vec<ObjectName>,
) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| CdistError::io(dir, e))? {
        let entry = entry.map_err(|e| CdistError::io(dir, e))?;
        let path = entry.path();
        if !path.is_dir() || entry.file_name() == OBJECT_MARKER {
            continue;
        }
        if path.join(OBJECT_MARKER).is_dir() {
            let id = path
                .strip_prefix(type_dir)
                .map_err(|_| CdistError::InvalidObjectName {
                    name: path.display().to_string(),
                    reason: "object directory outside its type directory".into(),
                })?
                .to_string_lossy()
                .into_owned();
            found.push(ObjectName::new(type_name, &id)?);
        }
        walk_type_dir(type_dir, &path, type_name, found)?;
    }
    Ok(())
}


/// Read one object's metadata back from disk.
pub fn read_object(object_root: &Path, name: &ObjectName) -> Result<CdistObject> {
    let meta = meta_dir(object_root, name);
    let marker = read_lines(&meta.join(STATE_FILE))?;
    let marker = marker.first().map(String::as_str).unwrap_or("");
    let state = ObjectState::from_marker(marker).ok_or_else(|| CdistError::InvalidObjectName {
        name: name.to_string(),
        reason: format!("unknown state marker '{}'", marker),
    })?;
    Ok(CdistObject {
        name: name.clone(),
        state,
        requirements: parse_names(read_lines(&meta.join(REQUIRE_FILE))?)?,
        autorequire: parse_names(read_lines(&meta.join(AUTOREQUIRE_FILE))?)?,
        code_local: meta.join(CODE_LOCAL_FILE).is_file(),
        code_remote: meta.join(CODE_REMOTE_FILE).is_file(),
        changed: meta.join(CHANGED_FILE).exists(),
    })
}


/// Persist an object's metadata. Generated code files are owned by the code
/// gateway and are left alone.
pub fn write_object(object_root: &Path, object: &CdistObject) -> Result<()> {
    let meta = meta_dir(object_root, &object.name);
    std::fs::create_dir_all(&meta).map_err(|e| CdistError::io(&meta, e))?;

    let state_path = meta.join(STATE_FILE);
    match object.state.as_marker() {
        Some(marker) => write_lines(&state_path, &[marker])?,
        None => remove_if_present(&state_path)?,
    }

    let require: Vec<String> = object.requirements.iter().map(ToString::to_string).collect();
    write_lines(&meta.join(REQUIRE_FILE), &require)?;
    let autorequire: Vec<String> = object.autorequire.iter().map(ToString::to_string).collect();
    write_lines(&meta.join(AUTOREQUIRE_FILE), &autorequire)?;

    let changed_path = meta.join(CHANGED_FILE);
    if object.changed {
        std::fs::write(&changed_path, "").map_err(|e| CdistError::io(&changed_path, e))?;
    } else {
        remove_if_present(&changed_path)?;
    }
    Ok(())
}


fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CdistError::io(path, e)),
    }
}
