use anyhow::Result;
use colored::Colorize;

use nakka_scraper::cli::Command;
use nakka_scraper::{
    handle_completions, handle_matches, handle_results, handle_tournaments, interpret,
};

fn main() {
    setup_logging();
    parse_and_execute().unwrap_or_else(|e| {
        eprintln!("{} {e:#}", "Error:".red().bold());
        std::process::exit(1);
    });
}

fn setup_logging() {
    sensible_env_logger::init!();
}

fn parse_and_execute() -> Result<()> {
    let command = interpret();
    execute_command(&command)
}

fn execute_command(command: &Command) -> Result<()> {
    match command {
        Command::Tournaments { keyword } => handle_tournaments(keyword),
        Command::Matches { href } => handle_matches(href),
        Command::Results {
            href,
            match_id,
            max_attempts,
        } => handle_results(href, match_id, *max_attempts),
        Command::Completions { shell } => handle_completions(*shell),
    }
}
