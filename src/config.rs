//! Run configuration loading
//!
//! `config.toml` in the config directory holds the [`declarative::Config`]
//! settings. Every key is optional:
//!
//! ```toml
//! crontab_marker = "Converge"
//!
//! [diff]
//! disabled = false
//! filesize_threshold = 10000000
//!
//! [backup]
//! path = "/var/backups/converge"
//! ```

use anyhow::{Context, Result};
use declarative::Config;
use std::fs;
use std::path::Path;

use crate::paths;

/// Load the run configuration from the config directory.
pub fn load() -> Result<Config> {
    load_from(&paths::config_file()?)
}

/// Load the run configuration from `path`; a missing file yields defaults.
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let mut config: Config =
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))?;
    if let Some(backup_dir) = &config.backup.path {
        config.backup.path = Some(paths::expand(&backup_dir.to_string_lossy()));
    }
    log::debug!("Loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "crontab_marker = \"Site\"\n\n[backup]\npath = \"/var/backups/site\"\n",
        )
        .unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.crontab_marker, "Site");
        assert_eq!(config.backup.path, Some(PathBuf::from("/var/backups/site")));
        assert!(!config.why_run);
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "crontab_marker = [").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }

    #[test]
    fn test_backup_path_is_expanded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[backup]\npath = \"~/backups\"\n").unwrap();

        let config = load_from(&path).unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(config.backup.path, Some(home.join("backups")));
    }
}
