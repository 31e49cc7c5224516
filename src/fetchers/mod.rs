pub mod dates;
pub mod matches;
pub mod player_results;
pub mod tournaments;

pub use dates::{DateResolver, DateStrategy};
pub use matches::{MatchDiscovery, tournament_id_from_href};
pub use player_results::PlayerResultExtractor;
pub use tournaments::TournamentDiscovery;
