pub mod compare;
pub mod rri;

pub use compare::{compare_heartbeats, MatchResult};
pub use rri::rri_similarity;
