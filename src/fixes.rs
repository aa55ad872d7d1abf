use crate::{
    backup::{self, BackupOutcome},
    game::{InstallationPath, EXE_NAME, GAME_NAME},
    logging::RunLog,
    registry::{layers_value, CompatFlag, SettingsStore},
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

pub const LAUNCHER_NAME: &str = "RainbowSix_Fixed.bat";
pub const MISSION_CONFIG_NAME: &str = "mission_fixes.cfg";
pub const AUDIO_CONFIG_NAME: &str = "audio.cfg";

const AUDIO_SUBSTITUTIONS: [(&str, &str); 5] = [
    ("SoundChannels=32", "SoundChannels=16"),
    ("3DSound=1", "3DSound=0"),
    ("UseEAX=1", "UseEAX=0"),
    ("UseSurround=1", "UseSurround=0"),
    ("SampleRate=44100", "SampleRate=22050"),
];

const DEFAULT_AUDIO_CONFIG: &str = "[Audio]
SoundChannels=16
3DSound=0
UseEAX=0
UseSurround=0
SampleRate=22050
AudioQuality=Low
DisableHardwareAcceleration=1
";

const MISSION_CONFIG: &str = "[MissionFixes]
; Disable problematic features for specific missions
DisableSmoke=1
DisableDynamicLighting=1
ReduceTextureQuality=1
DisableWeatherEffects=1

[MemoryFixes]
; Increase heap size for stability
HeapSize=256
UselargeAddressAware=1
";

pub const GRAPHICS_GUIDE: &str = "dgVoodoo2 Installation (Manual Step Required):

1. Download dgVoodoo2 from: https://dege.freeweb.hu/dgVoodoo2/dgVoodoo2/
2. Extract the following files to your Rainbow Six game folder:
   - D3D8.dll
   - D3D9.dll
   - D3DImm.dll
   - DDraw.dll
   - dgVoodoo.conf
   - dgVoodooCpl.exe

3. Run dgVoodooCpl.exe and configure:
   - Set resolution to your preference
   - Enable \"Force vSync\"
   - Set \"Videocard\" to your GPU
   - Apply and close

This fixes many graphics-related crashes and improves compatibility.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixId {
    Compatibility,
    Audio,
    CpuAffinity,
    MissionFixes,
    GraphicsGuide,
}

impl FixId {
    pub fn as_str(self) -> &'static str {
        match self {
            FixId::Compatibility => "compatibility",
            FixId::Audio => "audio",
            FixId::CpuAffinity => "cpu_affinity",
            FixId::MissionFixes => "mission_fixes",
            FixId::GraphicsGuide => "graphics_guide",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        CATALOGUE
            .iter()
            .map(|fix| fix.id)
            .find(|id| id.as_str() == value.trim())
    }

    pub fn descriptor(self) -> &'static FixDescriptor {
        CATALOGUE
            .iter()
            .find(|fix| fix.id == self)
            .unwrap_or(&CATALOGUE[0])
    }

    pub fn label(self) -> &'static str {
        self.descriptor().label
    }
}

pub fn default_selection() -> Vec<FixId> {
    CATALOGUE
        .iter()
        .filter(|fix| fix.default_enabled)
        .map(|fix| fix.id)
        .collect()
}

#[derive(Debug, Clone)]
pub struct FixOptions {
    pub compat_flags: Vec<CompatFlag>,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            compat_flags: vec![
                CompatFlag::RunAsAdmin,
                CompatFlag::Win98,
                CompatFlag::DisableDwm,
            ],
        }
    }
}

impl FixOptions {
    pub fn with_fixed_resolution(mut self, enabled: bool) -> Self {
        if enabled && !self.compat_flags.contains(&CompatFlag::FixedResolution) {
            self.compat_flags.push(CompatFlag::FixedResolution);
        }
        self
    }
}

pub struct FixContext<'a> {
    pub install: &'a InstallationPath,
    pub store: &'a mut dyn SettingsStore,
    pub options: &'a FixOptions,
    pub log: &'a mut RunLog,
}

/// One remediation. `apply` returns the message recorded for an Applied result.
pub struct FixDescriptor {
    pub id: FixId,
    pub label: &'static str,
    pub default_enabled: bool,
    pub applicable: fn(&InstallationPath) -> bool,
    pub unmet: &'static str,
    pub apply: fn(&mut FixContext<'_>) -> Result<String>,
}

pub static CATALOGUE: [FixDescriptor; 5] = [
    FixDescriptor {
        id: FixId::Compatibility,
        label: "Apply Windows 98 Compatibility Mode",
        default_enabled: true,
        applicable: executable_present,
        unmet: "game executable not found",
        apply: apply_compatibility_flags,
    },
    FixDescriptor {
        id: FixId::Audio,
        label: "Fix Audio Crashes (Disable EAX/3D Sound)",
        default_enabled: true,
        applicable: always,
        unmet: "",
        apply: apply_audio_fix,
    },
    FixDescriptor {
        id: FixId::CpuAffinity,
        label: "Create CPU Affinity Launcher",
        default_enabled: true,
        applicable: always,
        unmet: "",
        apply: write_affinity_launcher,
    },
    FixDescriptor {
        id: FixId::MissionFixes,
        label: "Apply Mission-Specific Crash Fixes",
        default_enabled: true,
        applicable: always,
        unmet: "",
        apply: write_mission_config,
    },
    FixDescriptor {
        id: FixId::GraphicsGuide,
        label: "Show dgVoodoo2 Instructions (Graphics Fix)",
        default_enabled: true,
        applicable: always,
        unmet: "",
        apply: provide_graphics_guide,
    },
];

fn always(_: &InstallationPath) -> bool {
    true
}

fn executable_present(install: &InstallationPath) -> bool {
    install.executable().is_file()
}

fn apply_compatibility_flags(ctx: &mut FixContext<'_>) -> Result<String> {
    let exe = ctx.install.executable();
    if ctx.options.compat_flags.is_empty() {
        bail!("no compatibility flags configured");
    }
    let value = layers_value(&ctx.options.compat_flags);
    ctx.store
        .set_compat_layers(&exe, &value)
        .with_context(|| format!("set compatibility flags for {}", exe.display()))?;
    ctx.log.info(format!("Compat layers for {}: {value}", exe.display()));
    let described: Vec<&str> = ctx
        .options
        .compat_flags
        .iter()
        .map(|flag| flag.describe())
        .collect();
    Ok(format!("Applied compatibility flags ({})", described.join(", ")))
}

pub fn audio_config_candidates(install: &InstallationPath) -> Vec<PathBuf> {
    vec![
        install.join("data").join(AUDIO_CONFIG_NAME),
        install.join(AUDIO_CONFIG_NAME),
        install.join("sound.cfg"),
    ]
}

fn apply_audio_fix(ctx: &mut FixContext<'_>) -> Result<String> {
    let existing = audio_config_candidates(ctx.install)
        .into_iter()
        .find(|path| path.is_file());

    let Some(path) = existing else {
        let path = ctx.install.join(AUDIO_CONFIG_NAME);
        fs::write(&path, crlf(DEFAULT_AUDIO_CONFIG))
            .with_context(|| format!("write {}", path.display()))?;
        return Ok("Created custom audio configuration".to_string());
    };

    let relative = path
        .strip_prefix(ctx.install.root())
        .unwrap_or(&path)
        .display()
        .to_string();
    let raw = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
    let (patched, changed) = substitute_audio_settings(&raw);
    if changed == 0 {
        return Ok(format!("{relative} already uses compatible audio settings"));
    }

    let note = record_backup(backup::ensure_backup(&path), ctx.log);
    fs::write(&path, patched).with_context(|| format!("write {}", path.display()))?;
    Ok(audio_applied_message(&relative, changed, note.as_deref()))
}

/// Logs the backup outcome. Returns a note for the result message when the
/// original could not be preserved.
fn record_backup(outcome: BackupOutcome, log: &mut RunLog) -> Option<String> {
    match outcome {
        BackupOutcome::Created { backup, warning } => {
            log.info(format!("Backed up {}", backup.backup.display()));
            if let Some(warning) = warning {
                log.warn(warning);
            }
            None
        }
        BackupOutcome::Existing(backup) => {
            log.info(format!("Keeping existing backup {}", backup.backup.display()));
            None
        }
        BackupOutcome::Failed { backup, error } => {
            log.warn(format!(
                "Backup of {} failed, continuing: {error}",
                backup.original.display()
            ));
            Some(format!("backup failed: {error}"))
        }
    }
}

fn audio_applied_message(relative: &str, changed: usize, note: Option<&str>) -> String {
    let message = format!("Modified {relative} for audio compatibility ({changed} setting(s))");
    match note {
        Some(note) => format!("{message} ({note})"),
        None => message,
    }
}

/// Replaces each known `key=value` pair wherever it stands as a whole token.
///
/// A token starts at the beginning of a line or after whitespace and ends at
/// whitespace, end of input, or a `;` comment. Every other byte passes
/// through unchanged. Returns the new content and the number of replacements.
pub fn substitute_audio_settings(raw: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(raw.len());
    let mut changed = 0;
    let mut pos = 0;
    while pos < raw.len() {
        let starts_token = pos == 0 || raw[pos - 1].is_ascii_whitespace();
        let hit = starts_token
            .then(|| {
                AUDIO_SUBSTITUTIONS.iter().find(|(old, _)| {
                    raw[pos..].starts_with(old.as_bytes())
                        && ends_token(raw.get(pos + old.len()).copied())
                })
            })
            .flatten();
        match hit {
            Some((old, new)) => {
                out.extend_from_slice(new.as_bytes());
                pos += old.len();
                changed += 1;
            }
            None => {
                out.push(raw[pos]);
                pos += 1;
            }
        }
    }
    (out, changed)
}

fn ends_token(next: Option<u8>) -> bool {
    match next {
        None => true,
        Some(byte) => byte == b';' || byte.is_ascii_whitespace(),
    }
}

/// Game-read text files are written with CRLF endings.
fn crlf(text: &str) -> String {
    text.lines().map(|line| format!("{line}\r\n")).collect()
}

pub fn launcher_script() -> String {
    [
        "@echo off".to_string(),
        format!("echo Starting {GAME_NAME} with compatibility fixes..."),
        String::new(),
        "REM Set single CPU affinity to prevent timing issues".to_string(),
        format!("start /affinity 1 /high \"Rainbow Six\" \"{EXE_NAME}\""),
        String::new(),
        "exit".to_string(),
        String::new(),
    ]
    .join("\r\n")
}

fn write_affinity_launcher(ctx: &mut FixContext<'_>) -> Result<String> {
    let path = ctx.install.join(LAUNCHER_NAME);
    fs::write(&path, launcher_script()).with_context(|| format!("write {}", path.display()))?;
    Ok(format!("Created CPU affinity launcher ({LAUNCHER_NAME})"))
}

fn write_mission_config(ctx: &mut FixContext<'_>) -> Result<String> {
    let path = ctx.install.join(MISSION_CONFIG_NAME);
    fs::write(&path, crlf(MISSION_CONFIG)).with_context(|| format!("write {}", path.display()))?;
    Ok("Created mission crash fix configuration".to_string())
}

fn provide_graphics_guide(_: &mut FixContext<'_>) -> Result<String> {
    Ok("dgVoodoo2 installation instructions provided".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_touches_only_known_pairs() {
        let raw = b"[Audio]\r\nSoundChannels=32\r\n  3DSound=1\r\nMusicVolume=80\r\nSoundChannels=320\r\n";
        let (patched, changed) = substitute_audio_settings(raw);
        assert_eq!(changed, 2);
        assert_eq!(
            patched,
            b"[Audio]\r\nSoundChannels=16\r\n  3DSound=0\r\nMusicVolume=80\r\nSoundChannels=320\r\n"
        );
    }

    #[test]
    fn substitution_rewrites_pairs_followed_by_comments() {
        let raw = b"[Audio]\r\nSoundChannels=32 ; default\r\nUseEAX=1\t; creative\r\n3DSound=1;hw\r\nSoundChannels=320 ; big\r\nMyUseEAX=1\r\n";
        let (patched, changed) = substitute_audio_settings(raw);
        assert_eq!(changed, 3);
        assert_eq!(
            patched,
            b"[Audio]\r\nSoundChannels=16 ; default\r\nUseEAX=0\t; creative\r\n3DSound=0;hw\r\nSoundChannels=320 ; big\r\nMyUseEAX=1\r\n"
        );
    }

    #[test]
    fn failed_backup_is_named_in_applied_message() {
        let mut log = RunLog::memory();
        let original = PathBuf::from("data/audio.cfg");
        let note = record_backup(
            BackupOutcome::Failed {
                backup: crate::backup::ConfigBackup {
                    backup: crate::backup::backup_path(&original),
                    original,
                },
                error: "disk full".to_string(),
            },
            &mut log,
        );
        let message = audio_applied_message("data/audio.cfg", 2, note.as_deref());
        assert_eq!(
            message,
            "Modified data/audio.cfg for audio compatibility (2 setting(s)) (backup failed: disk full)"
        );
        assert!(log.entries().iter().any(|entry| entry.message.contains("disk full")));
    }

    #[test]
    fn game_read_files_use_crlf() {
        let written = crlf(MISSION_CONFIG);
        assert!(written.starts_with("[MissionFixes]\r\n"));
        assert!(written.contains("\r\n\r\n[MemoryFixes]\r\n"));
        assert_eq!(written.matches('\n').count(), written.matches("\r\n").count());
        assert!(crlf(DEFAULT_AUDIO_CONFIG).ends_with("DisableHardwareAcceleration=1\r\n"));
    }

    #[test]
    fn substitution_is_stable() {
        let raw = b"UseEAX=1\nUseSurround=1\nSampleRate=44100";
        let (once, changed) = substitute_audio_settings(raw);
        assert_eq!(changed, 3);
        let (twice, changed_again) = substitute_audio_settings(&once);
        assert_eq!(changed_again, 0);
        assert_eq!(once, twice);
        assert_eq!(twice, b"UseEAX=0\nUseSurround=0\nSampleRate=22050");
    }

    #[test]
    fn ids_round_trip_through_strings() {
        for fix in CATALOGUE.iter() {
            assert_eq!(FixId::parse(fix.id.as_str()), Some(fix.id));
            assert_eq!(fix.id.descriptor().label, fix.label);
        }
        assert_eq!(FixId::parse("turbo"), None);
    }

    #[test]
    fn launcher_pins_one_processor_at_high_priority() {
        let script = launcher_script();
        assert!(script.contains("start /affinity 1 /high"));
        assert!(script.contains(EXE_NAME));
        assert!(script.ends_with("exit\r\n"));
    }

    #[test]
    fn fixed_resolution_flag_is_opt_in() {
        assert!(!FixOptions::default().compat_flags.contains(&CompatFlag::FixedResolution));
        let options = FixOptions::default()
            .with_fixed_resolution(true)
            .with_fixed_resolution(true);
        assert_eq!(
            layers_value(&options.compat_flags),
            "~ RUNASADMIN WIN98 DISABLEDWM 640X480"
        );
    }
}
