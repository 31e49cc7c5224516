pub mod identifiers;
pub mod models;
pub mod stats;

pub use identifiers::{MatchIdentifier, StageTag};
pub use models::*;
pub use stats::StatsSheet;
