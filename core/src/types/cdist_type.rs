use std::path::{Path, PathBuf};

use crate::error::{CdistError, Result};

/// A type directory under `<conf>/type/<name>`. Read-only during a run;
/// every script is optional and absence simply means "nothing to do".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdistType {
    name: String,
    path: PathBuf,
}

impl CdistType {
    pub fn new(type_base: &Path, name: &str) -> Self {
        CdistType {
            name: name.to_string(),
            path: type_base.join(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join("manifest")
    }

    pub fn gencode_local_path(&self) -> PathBuf {
        self.path.join("gencode-local")
    }

    pub fn gencode_remote_path(&self) -> PathBuf {
        self.path.join("gencode-remote")
    }

    pub fn explorer_path(&self) -> PathBuf {
        self.path.join("explorer")
    }

    /// Names of the type's explorers, sorted.
    pub fn explorers(&self) -> Result<Vec<String>> {
        list_file_names(&self.explorer_path())
    }

    /// All types below `type_base`, sorted by name.
    pub fn list_types(type_base: &Path) -> Result<Vec<CdistType>> {
        if !type_base.is_dir() {
            return Ok(Vec::new());
        }
        let mut types = Vec::new();
        let entries = std::fs::read_dir(type_base).map_err(|e| CdistError::io(type_base, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CdistError::io(type_base, e))?;
            if entry.path().is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                types.push(CdistType::new(type_base, &name));
            }
        }
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }
}

/// Sorted names of the regular files in `dir`; a missing directory is empty.
pub fn list_file_names(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| CdistError::io(dir, e))? {
        let entry = entry.map_err(|e| CdistError::io(dir, e))?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_paths_live_under_type_dir() {
        let t = CdistType::new(Path::new("/conf/type"), "__file");
        assert_eq!(t.manifest_path(), PathBuf::from("/conf/type/__file/manifest"));
        assert_eq!(t.gencode_remote_path(), PathBuf::from("/conf/type/__file/gencode-remote"));
        assert_eq!(t.explorer_path(), PathBuf::from("/conf/type/__file/explorer"));
    }

    #[test]
    fn list_types_sorted_and_dirs_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("__package")).unwrap();
        std::fs::create_dir(dir.path().join("__file")).unwrap();
        std::fs::write(dir.path().join("README"), "not a type").unwrap();
        let names: Vec<String> = CdistType::list_types(dir.path())
            .unwrap()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["__file", "__package"]);
    }

    #[test]
    fn missing_explorer_dir_means_no_explorers() {
        let dir = tempfile::tempdir().unwrap();
        let t = CdistType::new(dir.path(), "__none");
        assert!(t.explorers().unwrap().is_empty());
    }

    #[test]
    fn explorers_listed_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let t = CdistType::new(dir.path(), "__file");
        std::fs::create_dir_all(t.explorer_path()).unwrap();
        std::fs::write(t.explorer_path().join("stat"), "").unwrap();
        std::fs::write(t.explorer_path().join("exists"), "").unwrap();
        assert_eq!(t.explorers().unwrap(), vec!["exists", "stat"]);
    }
}
