pub mod history_client;
pub mod parsers;

pub use history_client::HistoryClient;
