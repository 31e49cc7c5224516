pub mod api;
pub mod browser;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fetchers;
pub mod http;
pub mod rate_limiter;
pub mod retry;
pub mod services;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use cli::Cli;
use serde::Serialize;

use crate::cli::Command;
use crate::config::settings::AppConfig;
use crate::services::extraction::ExtractionService;

pub fn interpret() -> Command {
    let cli = Cli::parse();
    cli.command
}

pub fn handle_tournaments(keyword: &str) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let records = runtime.block_on(async {
        let service = build_service()?;
        service
            .search_tournaments(keyword)
            .await
            .with_context(|| format!("Tournament search for '{}' failed", keyword))
    })?;
    print_json(&records)
}

pub fn handle_matches(href: &str) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let matches = runtime.block_on(async {
        let service = build_service()?;
        service
            .list_matches(href)
            .await
            .with_context(|| format!("Listing matches of {} failed", href))
    })?;
    print_json(&matches)
}

pub fn handle_results(href: &str, match_id: &str, max_attempts: Option<u32>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let results = runtime.block_on(async {
        let service = build_service()?;
        service
            .extract_player_results(href, match_id, max_attempts)
            .await
            .with_context(|| format!("Extracting results of {} failed", match_id))
    })?;
    print_json(&results)
}

pub fn handle_completions(shell: Shell) -> Result<()> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
    Ok(())
}

fn build_service() -> Result<ExtractionService> {
    let config = AppConfig::from_env();
    ExtractionService::with_chromium(config).context("Failed to set up the scraper")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
