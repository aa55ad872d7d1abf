use crate::{
    config::AppConfig,
    engine::{Engine, FixOutcome, FixResult},
    fixes::{FixId, CATALOGUE},
    game::InstallationPath,
    locator::NotFound,
    logging::RunLog,
    registry, report,
};
use anyhow::Result;
use arboard::Clipboard;
use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
    thread,
};

#[derive(Debug, Clone)]
pub enum InputMode {
    Normal,
    EditingPath { buffer: String },
}

enum WorkerMessage {
    Detected {
        found: Result<InstallationPath, NotFound>,
        log: RunLog,
    },
    Applied {
        results: Vec<FixResult>,
        log: RunLog,
    },
}

pub struct App {
    pub config: AppConfig,
    pub install: Option<InstallationPath>,
    pub selected: usize,
    pub results: Vec<FixResult>,
    pub report: Option<String>,
    pub report_scroll: u16,
    pub status: String,
    pub input_mode: InputMode,
    pub log: RunLog,
    pub busy: bool,
    pub should_quit: bool,
    clipboard: Option<Clipboard>,
    worker_tx: Sender<WorkerMessage>,
    worker_rx: Receiver<WorkerMessage>,
}

impl App {
    pub fn initialize() -> Result<Self> {
        let config = AppConfig::load_or_create()?;
        let log = RunLog::with_file(config.log_path());
        let (worker_tx, worker_rx) = mpsc::channel();

        let mut app = Self {
            config,
            install: None,
            selected: 0,
            results: Vec::new(),
            report: None,
            report_scroll: 0,
            status: "Ready to apply fixes...".to_string(),
            input_mode: InputMode::Normal,
            log,
            busy: false,
            should_quit: false,
            clipboard: None,
            worker_tx,
            worker_rx,
        };

        app.log.info(format!("SixFix v{} started", env!("CARGO_PKG_VERSION")));
        if let Some(saved) = app.config.game_root.clone() {
            match InstallationPath::new(&saved) {
                Ok(install) => {
                    app.log.info(format!("Using saved game folder: {install}"));
                    app.install = Some(install);
                    return Ok(app);
                }
                Err(err) => app.log.warn(format!("Saved game folder ignored: {err}")),
            }
        }
        app.start_detect();
        Ok(app)
    }

    pub fn hint(&self) -> &'static str {
        "↑/↓ select | Space toggle | a apply | d detect | p path | c copy | q quit"
    }

    pub fn is_enabled(&self, id: FixId) -> bool {
        self.config.enabled_fixes.contains(&id)
    }

    pub fn move_selection(&mut self, delta: isize) {
        let last = CATALOGUE.len().saturating_sub(1) as isize;
        self.selected = (self.selected as isize + delta).clamp(0, last) as usize;
    }

    pub fn toggle_selected(&mut self) {
        let Some(fix) = CATALOGUE.get(self.selected) else {
            return;
        };
        if !self.config.enabled_fixes.remove(&fix.id) {
            self.config.enabled_fixes.insert(fix.id);
        }
        if let Err(err) = self.config.save() {
            self.log.warn(format!("Config save failed: {err:#}"));
        }
    }

    pub fn start_detect(&mut self) {
        if self.busy {
            return;
        }
        self.busy = true;
        self.status = "Auto-detecting game installation...".to_string();

        let data_dir = self.config.data_dir().to_path_buf();
        let log_path = self.config.log_path();
        let tx = self.worker_tx.clone();
        thread::spawn(move || {
            let mut log = RunLog::with_file(log_path);
            let mut engine = Engine::new(registry::default_store(&data_dir));
            let found = engine.locate(&mut log);
            let _ = tx.send(WorkerMessage::Detected { found, log });
        });
    }

    pub fn start_apply(&mut self) {
        if self.busy {
            return;
        }
        self.busy = true;
        self.status = "Applying fixes...".to_string();

        let data_dir = self.config.data_dir().to_path_buf();
        let log_path = self.config.log_path();
        let options = self.config.fix_options();
        let install = self.install.clone();
        let selected: BTreeSet<FixId> = self.config.enabled_fixes.clone();
        let tx = self.worker_tx.clone();
        thread::spawn(move || {
            let mut log = RunLog::with_file(log_path);
            let mut engine = Engine::new(registry::default_store(&data_dir)).with_options(options);
            engine.set_installation(install);
            let results = engine.apply(&selected, &mut log);
            let _ = tx.send(WorkerMessage::Applied { results, log });
        });
    }

    pub fn poll_worker(&mut self) {
        loop {
            match self.worker_rx.try_recv() {
                Ok(message) => self.handle_worker_message(message),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn handle_worker_message(&mut self, message: WorkerMessage) {
        self.busy = false;
        match message {
            WorkerMessage::Detected { found, log } => {
                self.log.absorb(log);
                match found {
                    Ok(install) => {
                        self.status = format!("Game found at: {install}");
                        self.remember(install);
                    }
                    Err(err) => {
                        self.status = "Could not auto-detect game. Press p to enter the path."
                            .to_string();
                        self.log.warn(err.to_string());
                    }
                }
            }
            WorkerMessage::Applied { results, log } => {
                self.log.absorb(log);
                let failed = results
                    .iter()
                    .filter(|result| result.outcome == FixOutcome::Failed)
                    .count();
                self.status = if failed == 0 {
                    "Fixes applied!".to_string()
                } else {
                    format!("Fixes applied with {failed} failure(s)")
                };
                let guidance = self.config.show_graphics_guide
                    && self.is_enabled(FixId::GraphicsGuide);
                self.report = Some(report::format(&results, guidance));
                self.report_scroll = 0;
                self.results = results;
            }
        }
    }

    pub fn begin_path_edit(&mut self) {
        let buffer = self
            .install
            .as_ref()
            .map(|install| install.to_string())
            .unwrap_or_default();
        self.input_mode = InputMode::EditingPath { buffer };
    }

    pub fn submit_path(&mut self, value: &str) {
        let path = PathBuf::from(value.trim());
        match InstallationPath::new(&path) {
            Ok(install) => {
                self.status = format!("Game folder set: {install}");
                self.remember(install);
            }
            Err(err) => {
                self.status = format!("Invalid game folder: {err}");
                self.log.warn(format!("Invalid game folder: {err}"));
            }
        }
    }

    fn remember(&mut self, install: InstallationPath) {
        self.config.game_root = Some(install.root().to_path_buf());
        if let Err(err) = self.config.save() {
            self.log.warn(format!("Config save failed: {err:#}"));
        }
        self.install = Some(install);
    }

    pub fn copy_report(&mut self) {
        let Some(report) = self.report.clone() else {
            self.status = "Nothing to copy yet".to_string();
            return;
        };
        let Some(clipboard) = self.clipboard_mut() else {
            return;
        };
        match clipboard.set_text(report) {
            Ok(()) => self.status = "Report copied to clipboard".to_string(),
            Err(err) => {
                self.status = format!("Copy failed: {err}");
                self.log.warn(format!("Copy failed: {err}"));
            }
        }
    }

    fn clipboard_mut(&mut self) -> Option<&mut Clipboard> {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => {
                    self.clipboard = Some(clipboard);
                }
                Err(err) => {
                    self.status = format!("Clipboard unavailable: {err}");
                    self.log.warn(format!("Clipboard unavailable: {err}"));
                    return None;
                }
            }
        }
        self.clipboard.as_mut()
    }

    pub fn scroll_report(&mut self, delta: i32) {
        self.report_scroll = (self.report_scroll as i32 + delta).max(0) as u16;
    }
}
