use std::{
    fmt,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const GAME_NAME: &str = "Tom Clancy's Rainbow Six";
pub const EXE_NAME: &str = "RainbowSix.exe";
/// Substring the distributor stores in the title's display name.
pub const REGISTRY_TITLE_MATCH: &str = "Rainbow Six";

#[derive(Debug, Error)]
pub enum InstallPathError {
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("{exe} not found in {}", .dir.display())]
    MissingExecutable { dir: PathBuf, exe: &'static str },
    #[error("resolve absolute path for {}: {source}", .path.display())]
    Absolute {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Verified game root: an absolute directory containing the main executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationPath(PathBuf);

impl InstallationPath {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, InstallPathError> {
        let path = path.as_ref();
        let absolute = std::path::absolute(path).map_err(|source| InstallPathError::Absolute {
            path: path.to_path_buf(),
            source,
        })?;
        if !absolute.is_dir() {
            return Err(InstallPathError::NotADirectory(absolute));
        }
        if !looks_like_game_root(&absolute) {
            return Err(InstallPathError::MissingExecutable {
                dir: absolute,
                exe: EXE_NAME,
            });
        }
        Ok(Self(absolute))
    }

    pub fn root(&self) -> &Path {
        &self.0
    }

    pub fn executable(&self) -> PathBuf {
        self.0.join(EXE_NAME)
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.0.join(relative)
    }
}

impl fmt::Display for InstallationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

pub fn looks_like_game_root(path: &Path) -> bool {
    path.join(EXE_NAME).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn accepts_directory_with_executable() {
        let td = tempfile::tempdir().expect("tempdir");
        fs::write(td.path().join(EXE_NAME), b"MZ").unwrap();

        let install = InstallationPath::new(td.path()).unwrap();
        assert!(install.root().is_absolute());
        assert_eq!(install.executable(), install.root().join(EXE_NAME));
    }

    #[test]
    fn rejects_directory_without_executable() {
        let td = tempfile::tempdir().expect("tempdir");
        let err = InstallationPath::new(td.path()).unwrap_err();
        assert!(matches!(err, InstallPathError::MissingExecutable { .. }));
    }

    #[test]
    fn rejects_missing_directory() {
        let td = tempfile::tempdir().expect("tempdir");
        let err = InstallationPath::new(td.path().join("nope")).unwrap_err();
        assert!(matches!(err, InstallPathError::NotADirectory(_)));
    }
}
