pub mod errors;
pub mod factory;
pub mod service;

pub use errors::MatchError;
pub use factory::AppFactory;
pub use service::{MatchRequest, MatchResponse, MatchService};
