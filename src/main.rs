mod app;
mod backup;
mod cli;
mod config;
mod engine;
mod fixes;
mod game;
mod locator;
mod logging;
mod registry;
mod report;
mod ui;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
