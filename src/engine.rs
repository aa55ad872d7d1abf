use crate::{
    fixes::{FixContext, FixDescriptor, FixId, FixOptions, CATALOGUE},
    game::InstallationPath,
    locator::{Locator, NotFound},
    logging::RunLog,
    registry::SettingsStore,
};
use serde::Serialize;
use std::collections::BTreeSet;

pub const NO_INSTALLATION: &str = "no installation path";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixOutcome {
    Applied,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixResult {
    pub id: FixId,
    pub outcome: FixOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FixResult {
    fn new(id: FixId, outcome: FixOutcome, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome,
            message: Some(message.into()),
        }
    }
}

/// Runs selected catalogue entries against one installation.
///
/// Every requested fix yields exactly one [`FixResult`]; a failing fix never
/// stops the ones after it.
pub struct Engine<S> {
    store: S,
    install: Option<InstallationPath>,
    options: FixOptions,
}

impl<S: SettingsStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            install: None,
            options: FixOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FixOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn installation(&self) -> Option<&InstallationPath> {
        self.install.as_ref()
    }

    pub fn set_installation(&mut self, install: Option<InstallationPath>) {
        self.install = install;
    }

    pub fn locate(&mut self, log: &mut RunLog) -> Result<InstallationPath, NotFound> {
        let found = Locator::new(&self.store).locate(log)?;
        self.install = Some(found.clone());
        Ok(found)
    }

    pub fn apply(&mut self, selected: &BTreeSet<FixId>, log: &mut RunLog) -> Vec<FixResult> {
        self.apply_catalogue(&CATALOGUE, selected, log)
    }

    pub fn apply_catalogue(
        &mut self,
        catalogue: &[FixDescriptor],
        selected: &BTreeSet<FixId>,
        log: &mut RunLog,
    ) -> Vec<FixResult> {
        let requested = catalogue.iter().filter(|fix| selected.contains(&fix.id));

        let Some(install) = self.install.as_ref() else {
            log.warn("No installation path set; skipping all fixes".to_string());
            return requested
                .map(|fix| FixResult::new(fix.id, FixOutcome::Skipped, NO_INSTALLATION))
                .collect();
        };

        let mut results = Vec::new();
        for fix in requested {
            if !(fix.applicable)(install) {
                log.info(format!("Skipped {}: {}", fix.id.as_str(), fix.unmet));
                results.push(FixResult::new(fix.id, FixOutcome::Skipped, fix.unmet));
                continue;
            }

            let mut ctx = FixContext {
                install,
                store: &mut self.store,
                options: &self.options,
                log: &mut *log,
            };
            let result = match (fix.apply)(&mut ctx) {
                Ok(message) => {
                    log.info(format!("Applied {}: {message}", fix.id.as_str()));
                    FixResult::new(fix.id, FixOutcome::Applied, message)
                }
                Err(err) => {
                    let message = format!("{err:#}");
                    log.error(format!("Failed {}: {message}", fix.id.as_str()));
                    FixResult::new(fix.id, FixOutcome::Failed, message)
                }
            };
            results.push(result);
        }
        results
    }
}
