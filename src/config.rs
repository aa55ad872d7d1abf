use crate::fixes::{self, FixId, FixOptions};
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub game_root: Option<PathBuf>,
    #[serde(default = "default_fixes")]
    pub enabled_fixes: BTreeSet<FixId>,
    #[serde(default = "default_true")]
    pub show_graphics_guide: bool,
    #[serde(default)]
    pub force_640x480: bool,
}

impl AppConfig {
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_in(base_data_dir()?)
    }

    pub fn load_or_create_in(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir).context("create app data dir")?;
        let path = data_dir.join("config.json");
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read app config")?;
            let mut config: AppConfig = serde_json::from_str(&raw).context("parse app config")?;
            config.data_dir = data_dir;
            return Ok(config);
        }

        let config = AppConfig {
            data_dir,
            game_root: None,
            enabled_fixes: default_fixes(),
            show_graphics_guide: true,
            force_640x480: false,
        };
        config.save()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).context("create app data dir")?;
        let raw = serde_json::to_string_pretty(self).context("serialize app config")?;
        fs::write(self.config_path(), raw).context("write app config")?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("sixfix.log")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn fix_options(&self) -> FixOptions {
        FixOptions::default().with_fixed_resolution(self.force_640x480)
    }
}

fn default_fixes() -> BTreeSet<FixId> {
    fixes::default_selection().into_iter().collect()
}

fn default_true() -> bool {
    true
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("sixfix"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_defaults_then_reloads_saved_values() {
        let td = tempfile::tempdir().expect("tempdir");
        let dir = td.path().join("sixfix");

        let mut config = AppConfig::load_or_create_in(dir.clone()).unwrap();
        assert!(config.show_graphics_guide);
        assert_eq!(config.enabled_fixes.len(), fixes::CATALOGUE.len());

        config.enabled_fixes.remove(&FixId::GraphicsGuide);
        config.game_root = Some(PathBuf::from("/games/r6"));
        config.save().unwrap();

        let reloaded = AppConfig::load_or_create_in(dir.clone()).unwrap();
        assert!(!reloaded.enabled_fixes.contains(&FixId::GraphicsGuide));
        assert_eq!(reloaded.game_root, Some(PathBuf::from("/games/r6")));
        assert_eq!(reloaded.data_dir, dir);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let td = tempfile::tempdir().expect("tempdir");
        fs::write(td.path().join("config.json"), "{}").unwrap();

        let config = AppConfig::load_or_create_in(td.path().to_path_buf()).unwrap();
        assert_eq!(config.enabled_fixes, default_fixes());
        assert!(!config.force_640x480);
        assert!(config.fix_options().compat_flags.len() == 3);
    }
}
