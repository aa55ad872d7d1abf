use crate::{
    game::{looks_like_game_root, InstallationPath, GAME_NAME, REGISTRY_TITLE_MATCH},
    logging::RunLog,
    registry::SettingsStore,
};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("no Rainbow Six installation found; select the game folder manually")]
pub struct NotFound;

pub struct Locator<'a> {
    store: &'a dyn SettingsStore,
    candidates: Vec<PathBuf>,
}

impl<'a> Locator<'a> {
    pub fn new(store: &'a dyn SettingsStore) -> Self {
        Self {
            store,
            candidates: default_install_candidates(),
        }
    }

    #[cfg(test)]
    pub fn with_candidates(store: &'a dyn SettingsStore, candidates: Vec<PathBuf>) -> Self {
        Self { store, candidates }
    }

    pub fn locate(&self, log: &mut RunLog) -> Result<InstallationPath, NotFound> {
        if let Some(found) = self.from_registry(log) {
            log.info(format!("Found {GAME_NAME} via registry: {found}"));
            return Ok(found);
        }
        if let Some(found) = self.from_known_paths() {
            log.info(format!("Found {GAME_NAME} at default location: {found}"));
            return Ok(found);
        }
        log.warn(format!("{GAME_NAME} not found; manual path required"));
        Err(NotFound)
    }

    fn from_registry(&self, log: &mut RunLog) -> Option<InstallationPath> {
        let titles = match self.store.installed_titles() {
            Ok(titles) => titles,
            Err(err) => {
                log.info(format!("Registry scan skipped: {err:#}"));
                return None;
            }
        };
        for title in titles {
            let Some(name) = title.name.as_deref() else {
                continue;
            };
            if !name.contains(REGISTRY_TITLE_MATCH) {
                continue;
            }
            let Some(path) = title.path.as_ref() else {
                continue;
            };
            // First verified match wins; duplicates are not disambiguated.
            match InstallationPath::new(path) {
                Ok(found) => return Some(found),
                Err(err) => log.info(format!("Registry entry {} rejected: {err}", title.key)),
            }
        }
        None
    }

    fn from_known_paths(&self) -> Option<InstallationPath> {
        self.candidates
            .iter()
            .filter(|path| looks_like_game_root(path))
            .find_map(|path| InstallationPath::new(path).ok())
    }
}

#[cfg(windows)]
pub fn default_install_candidates() -> Vec<PathBuf> {
    [
        r"C:\GOG Games\Tom Clancy's Rainbow Six",
        r"C:\Program Files (x86)\GOG Galaxy\Games\Tom Clancy's Rainbow Six",
        r"C:\Program Files\GOG Galaxy\Games\Tom Clancy's Rainbow Six",
        r"D:\GOG Games\Tom Clancy's Rainbow Six",
        r"D:\Games\Tom Clancy's Rainbow Six",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(not(windows))]
pub fn default_install_candidates() -> Vec<PathBuf> {
    use directories::BaseDirs;

    let Some(base) = BaseDirs::new() else {
        return Vec::new();
    };
    let home = base.home_dir();
    let drive_c = home.join(".wine/drive_c");
    vec![
        drive_c.join("GOG Games").join(GAME_NAME),
        drive_c.join("Program Files (x86)/GOG Galaxy/Games").join(GAME_NAME),
        drive_c.join("Program Files/GOG Galaxy/Games").join(GAME_NAME),
        home.join("Games/Heroic").join(GAME_NAME),
        home.join("Games/gog").join(GAME_NAME),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{game::EXE_NAME, registry::MemoryStore};
    use std::fs;
    use std::path::Path;

    fn game_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(EXE_NAME), b"MZ").unwrap();
        dir
    }

    #[test]
    fn registry_match_beats_known_path() {
        let td = tempfile::tempdir().expect("tempdir");
        let from_registry = game_dir(td.path(), "gog-registry");
        let well_known = game_dir(td.path(), "well-known");
        let store = MemoryStore::with_title("Tom Clancy's Rainbow Six", &from_registry);

        let locator = Locator::with_candidates(&store, vec![well_known]);
        let found = locator.locate(&mut RunLog::memory()).unwrap();
        assert_eq!(found.root(), from_registry.as_path());
    }

    #[test]
    fn falls_back_to_known_paths_in_order() {
        let td = tempfile::tempdir().expect("tempdir");
        let empty = td.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        let second = game_dir(td.path(), "second");
        let third = game_dir(td.path(), "third");
        let store = MemoryStore::default();

        let locator = Locator::with_candidates(&store, vec![empty, second.clone(), third]);
        let found = locator.locate(&mut RunLog::memory()).unwrap();
        assert_eq!(found.root(), second.as_path());
    }

    #[test]
    fn registry_entry_without_executable_is_ignored() {
        let td = tempfile::tempdir().expect("tempdir");
        let stale = td.path().join("stale");
        fs::create_dir_all(&stale).unwrap();
        let fallback = game_dir(td.path(), "fallback");
        let store = MemoryStore::with_title("Tom Clancy's Rainbow Six", &stale);

        let locator = Locator::with_candidates(&store, vec![fallback.clone()]);
        let found = locator.locate(&mut RunLog::memory()).unwrap();
        assert_eq!(found.root(), fallback.as_path());
    }

    #[test]
    fn title_match_is_case_sensitive() {
        let td = tempfile::tempdir().expect("tempdir");
        let dir = game_dir(td.path(), "game");
        let store = MemoryStore::with_title("rainbow six", &dir);

        let locator = Locator::with_candidates(&store, Vec::new());
        assert!(locator.locate(&mut RunLog::memory()).is_err());
    }

    #[test]
    fn reports_not_found() {
        let td = tempfile::tempdir().expect("tempdir");
        let store = MemoryStore::default();
        let locator = Locator::with_candidates(&store, vec![td.path().join("missing")]);
        assert!(locator.locate(&mut RunLog::memory()).is_err());
    }
}
