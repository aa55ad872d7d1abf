use anyhow::{bail, Context, Result};
use filetime::{set_file_mtime, FileTime};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const BACKUP_SUFFIX: &str = ".backup";

/// Original file and its preserved copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBackup {
    pub original: PathBuf,
    pub backup: PathBuf,
}

#[derive(Debug)]
pub enum BackupOutcome {
    /// `warning` is set when the copy landed but its mtime could not be kept.
    Created {
        backup: ConfigBackup,
        warning: Option<String>,
    },
    Existing(ConfigBackup),
    Failed { backup: ConfigBackup, error: String },
}

pub fn backup_path(original: &Path) -> PathBuf {
    let mut name = original
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(BACKUP_SUFFIX);
    original.with_file_name(name)
}

/// Copies `original` to its backup sibling unless one already exists.
///
/// An existing sibling is never overwritten: it holds the true original from
/// before the first mutation. Copy failures are reported, not raised; callers
/// go ahead with the mutation either way.
pub fn ensure_backup(original: &Path) -> BackupOutcome {
    let backup = ConfigBackup {
        original: original.to_path_buf(),
        backup: backup_path(original),
    };
    if backup.backup.exists() {
        return BackupOutcome::Existing(backup);
    }
    match copy_preserving_mtime(original, &backup.backup) {
        Ok(warning) => BackupOutcome::Created { backup, warning },
        Err(err) => BackupOutcome::Failed {
            backup,
            error: format!("{err:#}"),
        },
    }
}

/// Copies the backup sibling back over `original`. The backup is kept.
/// The second value is a warning when the mtime could not be restored.
pub fn restore_backup(original: &Path) -> Result<(ConfigBackup, Option<String>)> {
    let backup = backup_path(original);
    if !backup.is_file() {
        bail!("no backup for {}", original.display());
    }
    let warning = copy_preserving_mtime(&backup, original)?;
    Ok((
        ConfigBackup {
            original: original.to_path_buf(),
            backup,
        },
        warning,
    ))
}

/// Backups present for the given originals, in input order.
pub fn list_backups(originals: &[PathBuf]) -> Vec<ConfigBackup> {
    originals
        .iter()
        .map(|original| ConfigBackup {
            original: original.clone(),
            backup: backup_path(original),
        })
        .filter(|entry| entry.backup.is_file())
        .collect()
}

/// Copies bytes, then carries the mtime over on a best-effort basis.
fn copy_preserving_mtime(from: &Path, to: &Path) -> Result<Option<String>> {
    fs::copy(from, to)
        .with_context(|| format!("copy {} -> {}", from.display(), to.display()))?;
    let kept = fs::metadata(from)
        .and_then(|meta| set_file_mtime(to, FileTime::from_last_modification_time(&meta)));
    Ok(kept
        .err()
        .map(|err| format!("mtime of {} not preserved: {err}", to.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_sibling_uses_suffix() {
        let path = Path::new("/games/r6/data/audio.cfg");
        assert_eq!(backup_path(path), PathBuf::from("/games/r6/data/audio.cfg.backup"));
    }

    #[test]
    fn creates_backup_once_and_keeps_original_bytes() {
        let td = tempfile::tempdir().expect("tempdir");
        let cfg = td.path().join("audio.cfg");
        fs::write(&cfg, b"SoundChannels=32\n").unwrap();

        assert!(matches!(
            ensure_backup(&cfg),
            BackupOutcome::Created { warning: None, .. }
        ));
        fs::write(&cfg, b"SoundChannels=16\n").unwrap();
        let second = ensure_backup(&cfg);
        assert!(matches!(second, BackupOutcome::Existing(_)));

        assert_eq!(fs::read(backup_path(&cfg)).unwrap(), b"SoundChannels=32\n");
    }

    #[test]
    fn backup_keeps_original_mtime() {
        let td = tempfile::tempdir().expect("tempdir");
        let cfg = td.path().join("audio.cfg");
        fs::write(&cfg, b"SampleRate=44100\n").unwrap();
        let stamp = FileTime::from_unix_time(946_684_800, 0);
        set_file_mtime(&cfg, stamp).unwrap();

        ensure_backup(&cfg);
        let meta = fs::metadata(backup_path(&cfg)).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), stamp);
    }

    #[test]
    fn copy_failure_is_reported_not_raised() {
        let td = tempfile::tempdir().expect("tempdir");
        let missing = td.path().join("sound.cfg");
        let outcome = ensure_backup(&missing);
        assert!(matches!(outcome, BackupOutcome::Failed { .. }));
    }

    #[test]
    fn restore_copies_backup_over_original() {
        let td = tempfile::tempdir().expect("tempdir");
        let cfg = td.path().join("audio.cfg");
        fs::write(&cfg, b"UseEAX=1\n").unwrap();
        ensure_backup(&cfg);
        fs::write(&cfg, b"UseEAX=0\n").unwrap();

        let (restored, warning) = restore_backup(&cfg).unwrap();
        assert!(warning.is_none());
        assert_eq!(fs::read(&cfg).unwrap(), b"UseEAX=1\n");
        assert!(restored.backup.exists());
        assert_eq!(list_backups(&[cfg.clone(), td.path().join("other.cfg")]).len(), 1);
    }

    #[test]
    fn restore_without_backup_fails() {
        let td = tempfile::tempdir().expect("tempdir");
        assert!(restore_backup(&td.path().join("audio.cfg")).is_err());
    }
}
