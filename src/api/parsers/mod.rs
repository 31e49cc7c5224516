pub mod history;
pub mod listing;

pub use history::first_start_date;
pub use listing::parse_candidates;
