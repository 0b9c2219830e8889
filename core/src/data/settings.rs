use std::path::{Path, PathBuf};

use crate::error::{CdistError, Result};
use crate::types::config::Settings;


/// Name of the settings file inside the config directory.
pub const SETTINGS_FILE: &str = "settings.yaml";


/// Locate the config directory: explicit flag, then `CDIST_CONFIG_DIR`,
/// then `$HOME/.cdist`.
pub fn resolve_config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    config_dir_from(
        explicit,
        std::env::var("CDIST_CONFIG_DIR").ok(),
        std::env::var("HOME").ok(),
    )
}


fn config_dir_from(
    explicit: Option<&Path>,
    from_env: Option<String>,
    home: Option<String>,
) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = from_env.filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    match home.filter(|h| !h.is_empty()) {
        Some(home) => Ok(PathBuf::from(home).join(".cdist")),
        None => Err(CdistError::Settings(
            "HOME is not set; pass --config-dir or set CDIST_CONFIG_DIR".into(),
        )),
    }
}


/// Load settings for `config_dir`. A missing file yields defaults. Relative
/// `conf_dir` / `cache_dir` are anchored at `config_dir`.
pub fn load(config_dir: &Path) -> Result<Settings> {
    let path = config_dir.join(SETTINGS_FILE);
    let settings = if path.exists() {
        let content = std::fs::read_to_string(&path).map_err(|e| CdistError::io(&path, e))?;
        parse(&content)?
    } else {
        Settings::default()
    };
    Ok(anchor(settings, config_dir))
}


/// Parse settings from YAML text. An empty document is all defaults.
pub fn parse(content: &str) -> Result<Settings> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(content).map_err(|e| CdistError::Settings(e.to_string()))
}


pub fn save(path: &Path, settings: &Settings) -> Result<()> {
    let content =
        serde_yaml::to_string(settings).map_err(|e| CdistError::Settings(e.to_string()))?;
    std::fs::write(path, content).map_err(|e| CdistError::io(path, e))
}


fn anchor(mut settings: Settings, config_dir: &Path) -> Settings {
    if settings.conf_dir.is_relative() {
        settings.conf_dir = config_dir.join(&settings.conf_dir);
    }
    if settings.cache_dir.is_relative() {
        settings.cache_dir = config_dir.join(&settings.cache_dir);
    }
    settings
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::Strategy;

    #[test]
    fn parse_empty_returns_defaults() {
        assert_eq!(parse("").unwrap(), Settings::default());
        assert_eq!(parse("\n  \n").unwrap(), Settings::default());
    }

    #[test]
    fn parse_partial_yaml() {
        let s = parse(
            "remote_exec: ssh -p 2222\nscript_timeout_secs: 30\nstrategy: staged\n",
        )
        .unwrap();
        assert_eq!(s.remote_exec, "ssh -p 2222");
        assert_eq!(s.script_timeout_secs, Some(30));
        assert_eq!(s.strategy, Strategy::Staged);
        assert_eq!(s.remote_base_path, PathBuf::from("/var/lib/cdist"));
    }

    #[test]
    fn parse_invalid_strategy_fails() {
        let err = parse("strategy: eventually\n").unwrap_err();
        assert!(matches!(err, CdistError::Settings(_)));
    }

    #[test]
    fn load_missing_file_anchors_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load(dir.path()).unwrap();
        assert_eq!(s.conf_dir, dir.path().join("conf"));
        assert_eq!(s.cache_dir, dir.path().join("cache"));
    }

    #[test]
    fn absolute_dirs_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "conf_dir: /srv/cdist/conf\n").unwrap();
        let s = load(dir.path()).unwrap();
        assert_eq!(s.conf_dir, PathBuf::from("/srv/cdist/conf"));
        assert_eq!(s.cache_dir, dir.path().join("cache"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            conf_dir: PathBuf::from("/etc/cdist"),
            cache_dir: PathBuf::from("/var/cache/cdist"),
            lock_timeout_ms: 0,
            ..Settings::default()
        };
        save(&dir.path().join(SETTINGS_FILE), &settings).unwrap();
        assert_eq!(load(dir.path()).unwrap(), settings);
    }

    #[test]
    fn explicit_config_dir_wins() {
        let dir = resolve_config_dir(Some(Path::new("/opt/cdist"))).unwrap();
        assert_eq!(dir, PathBuf::from("/opt/cdist"));
    }

    #[test]
    fn config_dir_falls_back_to_env_then_home() {
        let from_env = config_dir_from(None, Some("/srv/cdist".into()), Some("/home/ops".into()));
        assert_eq!(from_env.unwrap(), PathBuf::from("/srv/cdist"));
        let from_home = config_dir_from(None, None, Some("/home/ops".into()));
        assert_eq!(from_home.unwrap(), PathBuf::from("/home/ops/.cdist"));
    }

    #[test]
    fn config_dir_without_home_is_an_error() {
        assert!(matches!(config_dir_from(None, None, None), Err(CdistError::Settings(_))));
        assert!(matches!(
            config_dir_from(None, Some(String::new()), Some(String::new())),
            Err(CdistError::Settings(_))
        ));
    }
}
