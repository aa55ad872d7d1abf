use crate::{
    app::App,
    backup,
    config::AppConfig,
    engine::{Engine, FixOutcome},
    fixes::{self, FixId, CATALOGUE, GRAPHICS_GUIDE},
    game::InstallationPath,
    logging::RunLog,
    registry::{self, SettingsStore},
    report, ui,
};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::{collections::BTreeSet, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct GlobalOptions {
    format: OutputFormat,
    path: Option<PathBuf>,
}

#[derive(Debug)]
enum CliAction {
    Ui,
    Command {
        command: CliCommand,
        format: OutputFormat,
        path: Option<PathBuf>,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Detect,
    Fixes,
    Apply(ApplyOptions),
    Restore,
    Guide,
    Paths,
    Help,
    Version,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ApplyOptions {
    only: Option<BTreeSet<FixId>>,
    skip: BTreeSet<FixId>,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        CliAction::Ui => {
            let mut app = App::initialize()?;
            ui::run(&mut app)
        }
        CliAction::Command {
            command,
            format,
            path,
        } => match command {
            CliCommand::Help => {
                print_help();
                Ok(())
            }
            CliCommand::Version => {
                println!("SixFix v{}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
            _ => run_command(command, format, path),
        },
    }
}

fn parse_args(args: &[String]) -> Result<CliAction> {
    if args.is_empty() {
        return Ok(CliAction::Ui);
    }

    if matches!(args.first().map(|s| s.as_str()), Some("--help" | "-h" | "help")) {
        return Ok(text_command(CliCommand::Help));
    }
    if matches!(args.first().map(|s| s.as_str()), Some("--version" | "-V" | "version")) {
        return Ok(text_command(CliCommand::Version));
    }

    let (global, tokens) = parse_global_options(args)?;
    let Some(head) = tokens.first() else {
        return Ok(CliAction::Ui);
    };
    let command = match head.as_str() {
        "detect" => CliCommand::Detect,
        "fixes" => CliCommand::Fixes,
        "apply" => CliCommand::Apply(parse_apply(tokens.get(1..).unwrap_or(&[]))?),
        "restore" => CliCommand::Restore,
        "guide" => CliCommand::Guide,
        "paths" => CliCommand::Paths,
        other => bail!("Unknown command: {other} (see --help)"),
    };
    Ok(CliAction::Command {
        command,
        format: global.format,
        path: global.path,
    })
}

fn text_command(command: CliCommand) -> CliAction {
    CliAction::Command {
        command,
        format: OutputFormat::Text,
        path: None,
    }
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut format = OutputFormat::Text;
    let mut path = None;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            format = OutputFormat::parse(value)
                .ok_or_else(|| anyhow!("Unknown format: {value} (use 'text' or 'json')"))?;
            continue;
        }
        if arg == "--format" {
            let value = iter.next().ok_or_else(|| anyhow!("--format requires a value"))?;
            format = OutputFormat::parse(value)
                .ok_or_else(|| anyhow!("Unknown format: {value} (use 'text' or 'json')"))?;
            continue;
        }
        if let Some(value) = arg.strip_prefix("--path=") {
            path = Some(PathBuf::from(value));
            continue;
        }
        if arg == "--path" {
            let value = iter.next().ok_or_else(|| anyhow!("--path requires a value"))?;
            path = Some(PathBuf::from(value));
            continue;
        }
        tokens.push(arg.to_string());
    }

    Ok((GlobalOptions { format, path }, tokens))
}

fn parse_apply(args: &[String]) -> Result<ApplyOptions> {
    let mut options = ApplyOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--only" => {
                let value = iter.next().ok_or_else(|| anyhow!("--only requires a value"))?;
                options.only = Some(parse_fix_list(value)?);
            }
            value if value.starts_with("--only=") => {
                options.only = Some(parse_fix_list(value.trim_start_matches("--only="))?);
            }
            "--skip" => {
                let value = iter.next().ok_or_else(|| anyhow!("--skip requires a value"))?;
                options.skip.extend(parse_fix_list(value)?);
            }
            value if value.starts_with("--skip=") => {
                options.skip.extend(parse_fix_list(value.trim_start_matches("--skip="))?);
            }
            other => bail!("Unknown apply option: {other}"),
        }
    }
    Ok(options)
}

fn parse_fix_list(value: &str) -> Result<BTreeSet<FixId>> {
    value
        .split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| FixId::parse(item).ok_or_else(|| anyhow!("Unknown fix: {}", item.trim())))
        .collect()
}

fn run_command(command: CliCommand, format: OutputFormat, path: Option<PathBuf>) -> Result<()> {
    let mut config = AppConfig::load_or_create()?;
    let mut log = RunLog::with_file(config.log_path()).echo_stderr(true);
    let store = registry::default_store(config.data_dir());
    let mut engine = Engine::new(store).with_options(config.fix_options());

    match command {
        CliCommand::Detect => detect(&mut engine, &mut config, path, format, &mut log),
        CliCommand::Fixes => list_fixes(&config, format),
        CliCommand::Apply(options) => {
            resolve_installation(&mut engine, &mut config, path, &mut log)?;
            apply(&mut engine, &config, options, format, &mut log)
        }
        CliCommand::Restore => {
            resolve_installation(&mut engine, &mut config, path, &mut log)?;
            restore(&engine, format)
        }
        CliCommand::Guide => {
            print!("{GRAPHICS_GUIDE}");
            Ok(())
        }
        CliCommand::Paths => list_paths(&config, &log, format),
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

/// Explicit path first, then the remembered one, then auto-detection. A bad
/// explicit path is an error; detection failure leaves the engine without a
/// path so every fix reports Skipped.
fn resolve_installation<S: SettingsStore>(
    engine: &mut Engine<S>,
    config: &mut AppConfig,
    path: Option<PathBuf>,
    log: &mut RunLog,
) -> Result<()> {
    if let Some(path) = path {
        let install = InstallationPath::new(&path)
            .with_context(|| format!("use {} as game folder", path.display()))?;
        remember(config, &install, log);
        engine.set_installation(Some(install));
        return Ok(());
    }

    if let Some(saved) = config.game_root.clone() {
        match InstallationPath::new(&saved) {
            Ok(install) => {
                log.info(format!("Using saved game folder: {install}"));
                engine.set_installation(Some(install));
                return Ok(());
            }
            Err(err) => log.warn(format!("Saved game folder ignored: {err}")),
        }
    }

    match engine.locate(log) {
        Ok(install) => remember(config, &install, log),
        Err(err) => log.warn(format!("{err} (pass --path <dir>)")),
    }
    Ok(())
}

fn remember(config: &mut AppConfig, install: &InstallationPath, log: &mut RunLog) {
    if config.game_root.as_deref() == Some(install.root()) {
        return;
    }
    config.game_root = Some(install.root().to_path_buf());
    if let Err(err) = config.save() {
        log.warn(format!("Config save failed: {err:#}"));
    }
}

#[derive(Serialize)]
struct DetectOutput {
    found: bool,
    path: Option<String>,
    compat_layers: Option<String>,
}

fn detect<S: SettingsStore>(
    engine: &mut Engine<S>,
    config: &mut AppConfig,
    path: Option<PathBuf>,
    format: OutputFormat,
    log: &mut RunLog,
) -> Result<()> {
    let found = match path {
        Some(path) => Some(
            InstallationPath::new(&path)
                .with_context(|| format!("use {} as game folder", path.display()))?,
        ),
        None => engine.locate(log).ok(),
    };
    if let Some(install) = &found {
        remember(config, install, log);
    }

    let compat_layers = match &found {
        Some(install) => match engine.store().compat_layers(&install.executable()) {
            Ok(value) => value,
            Err(err) => {
                log.warn(format!("Compat layers unreadable: {err:#}"));
                None
            }
        },
        None => None,
    };

    let output = DetectOutput {
        found: found.is_some(),
        path: found.as_ref().map(|install| install.to_string()),
        compat_layers,
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => match &output.path {
            Some(path) => {
                println!("Game found at: {path}");
                println!(
                    "Compatibility flags: {}",
                    output.compat_layers.as_deref().unwrap_or("(none)")
                );
            }
            None => println!("Could not auto-detect game. Pass --path <dir>."),
        },
    }
    Ok(())
}

#[derive(Serialize)]
struct FixListItem {
    id: FixId,
    label: &'static str,
    default_enabled: bool,
    enabled: bool,
}

fn list_fixes(config: &AppConfig, format: OutputFormat) -> Result<()> {
    let items: Vec<FixListItem> = CATALOGUE
        .iter()
        .map(|fix| FixListItem {
            id: fix.id,
            label: fix.label,
            default_enabled: fix.default_enabled,
            enabled: config.enabled_fixes.contains(&fix.id),
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            for item in items {
                let mark = if item.enabled { "x" } else { " " };
                println!("[{mark}] {:<15} {}", item.id.as_str(), item.label);
            }
        }
    }
    Ok(())
}

fn selection(config: &AppConfig, options: ApplyOptions) -> BTreeSet<FixId> {
    let mut selected = options
        .only
        .unwrap_or_else(|| config.enabled_fixes.clone());
    selected.retain(|id| !options.skip.contains(id));
    selected
}

fn apply<S: SettingsStore>(
    engine: &mut Engine<S>,
    config: &AppConfig,
    options: ApplyOptions,
    format: OutputFormat,
    log: &mut RunLog,
) -> Result<()> {
    let selected = selection(config, options);
    let results = engine.apply(&selected, log);
    let guidance = config.show_graphics_guide && selected.contains(&FixId::GraphicsGuide);

    match format {
        OutputFormat::Json => println!("{}", report::format_json(&results, guidance)?),
        OutputFormat::Text => print!("{}", report::format(&results, guidance)),
    }

    let failed = results
        .iter()
        .filter(|result| result.outcome == FixOutcome::Failed)
        .count();
    if failed > 0 {
        bail!("{failed} fix(es) failed; details in {}", config.log_path().display());
    }
    Ok(())
}

#[derive(Serialize)]
struct RestoreItem {
    original: String,
    backup: String,
    restored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
    error: Option<String>,
}

fn restore<S: SettingsStore>(engine: &Engine<S>, format: OutputFormat) -> Result<()> {
    let install = engine
        .installation()
        .ok_or_else(|| anyhow!("No game folder found; pass --path <dir>"))?;
    let items: Vec<RestoreItem> = backup::list_backups(&fixes::audio_config_candidates(install))
        .into_iter()
        .map(|entry| {
            let (warning, error) = match backup::restore_backup(&entry.original) {
                Ok((_, warning)) => (warning, None),
                Err(err) => (None, Some(format!("{err:#}"))),
            };
            RestoreItem {
                original: entry.original.display().to_string(),
                backup: entry.backup.display().to_string(),
                restored: error.is_none(),
                warning,
                error,
            }
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No backups found in {install}");
            }
            for item in &items {
                match &item.error {
                    None => {
                        println!("Restored {} from {}", item.original, item.backup);
                        if let Some(warning) = &item.warning {
                            println!("  warning: {warning}");
                        }
                    }
                    Some(err) => println!("Failed to restore {}: {err}", item.original),
                }
            }
        }
    }
    if items.iter().any(|item| !item.restored) {
        bail!("restore incomplete");
    }
    Ok(())
}

#[derive(Serialize)]
struct PathsOutput {
    data_dir: String,
    config: String,
    log: Option<String>,
    compat_store: Option<String>,
    game_root: Option<String>,
}

fn list_paths(config: &AppConfig, log: &RunLog, format: OutputFormat) -> Result<()> {
    let output = PathsOutput {
        data_dir: config.data_dir().display().to_string(),
        config: config.config_path().display().to_string(),
        log: log.file_path().map(|path| path.display().to_string()),
        compat_store: compat_store_path(config),
        game_root: config
            .game_root
            .as_ref()
            .map(|path| path.display().to_string()),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => {
            println!("Data dir: {}", output.data_dir);
            println!("Config: {}", output.config);
            if let Some(log) = &output.log {
                println!("Log: {log}");
            }
            if let Some(store) = &output.compat_store {
                println!("Compat flags store: {store}");
            }
            println!(
                "Game root: {}",
                output.game_root.as_deref().unwrap_or("(not set)")
            );
        }
    }
    Ok(())
}

#[cfg(windows)]
fn compat_store_path(_: &AppConfig) -> Option<String> {
    None
}

#[cfg(not(windows))]
fn compat_store_path(config: &AppConfig) -> Option<String> {
    let store = registry::FileStore::new(config.data_dir());
    Some(store.path().display().to_string())
}

fn print_help() {
    println!("SixFix v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  sixfix                          Launch TUI");
    println!("  sixfix detect                   Locate the game installation");
    println!("  sixfix fixes                    List available fixes");
    println!("  sixfix apply                    Apply enabled fixes");
    println!("  sixfix restore                  Restore audio config from backup");
    println!("  sixfix guide                    Print dgVoodoo2 instructions");
    println!("  sixfix paths                    Show config and log paths");
    println!();
    println!("Global options:");
    println!("  --path <dir>                    Game folder (skips auto-detect)");
    println!("  --format <json|text>            Output format");
    println!("  -h, --help                      Show help");
    println!("  -V, --version                   Show version");
    println!();
    println!("Apply options:");
    println!("  --only <ids>                    Comma-separated fixes to run");
    println!("  --skip <ids>                    Comma-separated fixes to leave out");
    println!();
    println!("Fix ids:");
    for fix in CATALOGUE.iter() {
        println!("  {:<31} {}", fix.id.as_str(), fix.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn no_arguments_launch_ui() {
        assert!(matches!(parse_args(&[]).unwrap(), CliAction::Ui));
    }

    #[test]
    fn parses_apply_with_global_options() {
        let action = parse_args(&args(&[
            "--format=json",
            "apply",
            "--only",
            "audio,cpu_affinity",
            "--path",
            "/games/r6",
        ]))
        .unwrap();
        let CliAction::Command {
            command,
            format,
            path,
        } = action
        else {
            panic!("expected command");
        };
        assert_eq!(format, OutputFormat::Json);
        assert_eq!(path, Some(PathBuf::from("/games/r6")));
        assert_eq!(
            command,
            CliCommand::Apply(ApplyOptions {
                only: Some([FixId::Audio, FixId::CpuAffinity].into_iter().collect()),
                skip: BTreeSet::new(),
            })
        );
    }

    #[test]
    fn rejects_unknown_fix_ids() {
        let err = parse_args(&args(&["apply", "--skip=turbo"])).unwrap_err();
        assert!(err.to_string().contains("Unknown fix: turbo"));
    }

    #[test]
    fn skip_narrows_configured_selection() {
        let td = tempfile::tempdir().expect("tempdir");
        let config = AppConfig::load_or_create_in(td.path().to_path_buf()).unwrap();
        let selected = selection(
            &config,
            ApplyOptions {
                only: None,
                skip: [FixId::GraphicsGuide].into_iter().collect(),
            },
        );
        assert_eq!(selected.len(), CATALOGUE.len() - 1);
        assert!(!selected.contains(&FixId::GraphicsGuide));
    }
}
