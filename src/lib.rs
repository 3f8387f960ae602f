//! Challenge search index
//!
//! Keeps a Redis-backed secondary index of challenges and answers faceted,
//! phonetic keyword searches over it. See [`search::ChallengeIndex`].

pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod search;
pub mod state;

pub use config::Config;
pub use error::{AppError, Result};
pub use models::{Challenge, ChallengeState};
pub use search::{ChallengeIndex, SearchRequest};
