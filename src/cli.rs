use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(author, version, about = "n01 darts tournament scraper")]
pub struct Cli {
    /// Command
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
#[clap(rename_all = "lower_case")]
pub enum Command {
    /// Search completed tournaments of the last year by keyword
    Tournaments {
        /// Search keyword
        keyword: String,
    },
    /// List played matches of a tournament
    Matches {
        /// Tournament page URL (must carry an `id` parameter)
        href: String,
    },
    /// Extract both players' statistics for one match
    Results {
        /// Match page URL
        href: String,
        /// Match identifier, `{tournament}_{stage}_{round}_{code}_{code}`
        match_id: String,
        /// Attempt ceiling (defaults to 3)
        #[arg(short, long = "max-attempts")]
        max_attempts: Option<u32>,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}
