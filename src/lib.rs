pub mod config;
pub mod error;
pub mod extractor;
pub mod matcher;
pub mod model;
pub mod protocol;
pub mod server;
pub mod similarity;

// Re-export vision types for convenience
pub use facematch_vision::{Face, FaceAnalyzer};

pub use error::{FaceMatchError, Result};
pub use extractor::FaceExtractor;
pub use matcher::{find_matches, MatchResult, Photo, RankingMode};
pub use model::ModelHandle;
pub use server::{Server, ServerState};
