use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompatFlag {
    RunAsAdmin,
    Win98,
    DisableDwm,
    FixedResolution,
}

impl CompatFlag {
    pub fn token(self) -> &'static str {
        match self {
            CompatFlag::RunAsAdmin => "RUNASADMIN",
            CompatFlag::Win98 => "WIN98",
            CompatFlag::DisableDwm => "DISABLEDWM",
            CompatFlag::FixedResolution => "640X480",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            CompatFlag::RunAsAdmin => "run as administrator",
            CompatFlag::Win98 => "Windows 98 compatibility mode",
            CompatFlag::DisableDwm => "desktop composition disabled",
            CompatFlag::FixedResolution => "640x480 resolution",
        }
    }
}

/// Value stored under the Layers key: `~` marks the entry as user-set.
pub fn layers_value(flags: &[CompatFlag]) -> String {
    let mut value = String::from("~");
    for flag in flags {
        value.push(' ');
        value.push_str(flag.token());
    }
    value
}

/// One subkey of the distributor's installed-titles namespace.
/// Values that could not be read are `None`.
#[derive(Debug, Clone, Default)]
pub struct InstalledTitle {
    pub key: String,
    pub name: Option<String>,
    pub path: Option<PathBuf>,
}

/// Persistent per-application settings: the installed-titles namespace (read)
/// and the per-executable compatibility layers (write).
pub trait SettingsStore {
    fn installed_titles(&self) -> Result<Vec<InstalledTitle>>;
    fn compat_layers(&self, exe: &Path) -> Result<Option<String>>;
    fn set_compat_layers(&mut self, exe: &Path, value: &str) -> Result<()>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for Box<T> {
    fn installed_titles(&self) -> Result<Vec<InstalledTitle>> {
        (**self).installed_titles()
    }

    fn compat_layers(&self, exe: &Path) -> Result<Option<String>> {
        (**self).compat_layers(exe)
    }

    fn set_compat_layers(&mut self, exe: &Path, value: &str) -> Result<()> {
        (**self).set_compat_layers(exe, value)
    }
}

#[cfg(windows)]
pub use windows_store::WindowsRegistry;

#[cfg(windows)]
mod windows_store {
    use super::{InstalledTitle, SettingsStore};
    use anyhow::{Context, Result};
    use std::{
        io,
        path::{Path, PathBuf},
    };
    use winreg::enums::*;
    use winreg::RegKey;

    const GOG_GAMES_KEY: &str = r"SOFTWARE\WOW6432Node\GOG.com\Games";
    const COMPAT_LAYERS_KEY: &str =
        r"SOFTWARE\Microsoft\Windows NT\CurrentVersion\AppCompatFlags\Layers";

    #[derive(Debug, Default)]
    pub struct WindowsRegistry;

    impl SettingsStore for WindowsRegistry {
        fn installed_titles(&self) -> Result<Vec<InstalledTitle>> {
            let games = RegKey::predef(HKEY_LOCAL_MACHINE)
                .open_subkey(GOG_GAMES_KEY)
                .context("open GOG games key")?;
            let mut titles = Vec::new();
            for key_name in games.enum_keys().filter_map(|name| name.ok()) {
                let Ok(key) = games.open_subkey(&key_name) else {
                    continue;
                };
                titles.push(InstalledTitle {
                    name: key.get_value::<String, _>("gameName").ok(),
                    path: key.get_value::<String, _>("path").ok().map(PathBuf::from),
                    key: key_name,
                });
            }
            Ok(titles)
        }

        fn compat_layers(&self, exe: &Path) -> Result<Option<String>> {
            let layers = match RegKey::predef(HKEY_CURRENT_USER).open_subkey(COMPAT_LAYERS_KEY) {
                Ok(key) => key,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(err).context("open compat layers key"),
            };
            match layers.get_value::<String, _>(exe.as_os_str()) {
                Ok(value) => Ok(Some(value)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err).context("read compat layers value"),
            }
        }

        fn set_compat_layers(&mut self, exe: &Path, value: &str) -> Result<()> {
            let (layers, _) = RegKey::predef(HKEY_CURRENT_USER)
                .create_subkey(COMPAT_LAYERS_KEY)
                .context("open compat layers key")?;
            layers
                .set_value(exe.as_os_str(), &value.to_string())
                .context("write compat layers value")?;
            Ok(())
        }
    }
}

#[cfg(not(windows))]
pub use file_store::FileStore;

#[cfg(not(windows))]
mod file_store {
    use super::{InstalledTitle, SettingsStore};
    use anyhow::{Context, Result};
    use serde::{Deserialize, Serialize};
    use std::{
        collections::BTreeMap,
        fs,
        path::{Path, PathBuf},
    };

    /// JSON-backed stand-in for the registry on targets without one. The
    /// installed-titles namespace is always empty there.
    #[derive(Debug)]
    pub struct FileStore {
        path: PathBuf,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct FileStoreData {
        #[serde(default)]
        layers: BTreeMap<String, String>,
    }

    impl FileStore {
        pub fn new(data_dir: &Path) -> Self {
            Self {
                path: data_dir.join("compat_layers.json"),
            }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn load(&self) -> Result<FileStoreData> {
            if !self.path.exists() {
                return Ok(FileStoreData::default());
            }
            let raw = fs::read_to_string(&self.path).context("read compat layers store")?;
            let data = serde_json::from_str(&raw).context("parse compat layers store")?;
            Ok(data)
        }
    }

    impl SettingsStore for FileStore {
        fn installed_titles(&self) -> Result<Vec<InstalledTitle>> {
            Ok(Vec::new())
        }

        fn compat_layers(&self, exe: &Path) -> Result<Option<String>> {
            let data = self.load()?;
            Ok(data.layers.get(&exe.to_string_lossy().into_owned()).cloned())
        }

        fn set_compat_layers(&mut self, exe: &Path, value: &str) -> Result<()> {
            let mut data = self.load()?;
            data.layers
                .insert(exe.to_string_lossy().into_owned(), value.to_string());
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).context("create compat layers store dir")?;
            }
            let raw = serde_json::to_string_pretty(&data).context("serialize compat layers store")?;
            fs::write(&self.path, raw).context("write compat layers store")?;
            Ok(())
        }
    }
}

/// The platform's native store.
pub fn default_store(data_dir: &Path) -> Box<dyn SettingsStore + Send> {
    #[cfg(windows)]
    {
        let _ = data_dir;
        Box::new(WindowsRegistry)
    }
    #[cfg(not(windows))]
    {
        Box::new(FileStore::new(data_dir))
    }
}

#[cfg(test)]
pub use memory::MemoryStore;

#[cfg(test)]
mod memory {
    use super::{InstalledTitle, SettingsStore};
    use anyhow::{bail, Result};
    use std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
    };

    #[derive(Debug, Default)]
    pub struct MemoryStore {
        pub titles: Option<Vec<InstalledTitle>>,
        pub layers: BTreeMap<PathBuf, String>,
        pub writes: usize,
        pub fail_writes: bool,
    }

    impl MemoryStore {
        pub fn with_title(name: &str, path: &Path) -> Self {
            Self {
                titles: Some(vec![InstalledTitle {
                    key: "1207658870".to_string(),
                    name: Some(name.to_string()),
                    path: Some(path.to_path_buf()),
                }]),
                ..Self::default()
            }
        }
    }

    impl SettingsStore for MemoryStore {
        fn installed_titles(&self) -> Result<Vec<InstalledTitle>> {
            match &self.titles {
                Some(titles) => Ok(titles.clone()),
                None => bail!("namespace missing"),
            }
        }

        fn compat_layers(&self, exe: &Path) -> Result<Option<String>> {
            Ok(self.layers.get(exe).cloned())
        }

        fn set_compat_layers(&mut self, exe: &Path, value: &str) -> Result<()> {
            if self.fail_writes {
                bail!("access denied");
            }
            self.writes += 1;
            self.layers.insert(exe.to_path_buf(), value.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_value_uses_tilde_prefix() {
        let value = layers_value(&[CompatFlag::RunAsAdmin, CompatFlag::Win98, CompatFlag::DisableDwm]);
        assert_eq!(value, "~ RUNASADMIN WIN98 DISABLEDWM");
    }

    #[cfg(not(windows))]
    #[test]
    fn file_store_round_trips_layers() {
        let td = tempfile::tempdir().expect("tempdir");
        let exe = td.path().join("game").join("RainbowSix.exe");
        let mut store = FileStore::new(td.path());

        assert_eq!(store.compat_layers(&exe).unwrap(), None);
        store.set_compat_layers(&exe, "~ WIN98").unwrap();
        store.set_compat_layers(&exe, "~ WIN98").unwrap();

        let reopened = FileStore::new(td.path());
        assert_eq!(reopened.compat_layers(&exe).unwrap().as_deref(), Some("~ WIN98"));
        assert!(reopened.installed_titles().unwrap().is_empty());
    }
}
