//! Faceted and phonetic challenge search over a key-value store
//!
//! Each challenge is written into a family of store keys: one set per facet
//! value, sorted sets for numeric facets, per-id sort values and a hash of
//! raw payloads. A search resolves every filter to a set, intersects them
//! into a short-lived key, sorts that key through the per-id sort values and
//! loads the payloads.
//!
//! ```text
//! SearchRequest ──► QueryPlanner ──► ResultSet ──► ResultSorter ──► Vec<Challenge>
//!                       │                              │
//!                       ▼                              ▼
//!                 union / inter / range           SORT BY + HMGET
//!                       │                              │
//!                       └──────────► IndexStore ◄──────┘
//!                                        ▲
//!           IndexWriter (upsert/remove) ─┘◄─ Reconciler (full rebuild)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use challenge_index::config::IndexConfig;
//! use challenge_index::search::{ChallengeIndex, SearchRequest, SortField};
//! use challenge_index::state::create_in_memory_store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let index = ChallengeIndex::new(create_in_memory_store(), IndexConfig::default())?;
//!
//!     let request = SearchRequest::new()
//!         .with_query("ruby")
//!         .with_platforms(["heroku"])
//!         .sort_by(SortField::EndDate);
//!
//!     for challenge in index.search(&request).await? {
//!         println!("{} {}", challenge.challenge_id, challenge.name);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod keys;
pub mod phonetic;
pub mod planner;
pub mod query;
pub mod reconcile;
pub mod sorter;
pub mod service;
pub mod writer;

pub use keys::{Keyspace, Registry};
pub use planner::{QueryPlanner, ResultSet};
pub use query::{Facet, FacetFilter, NumericFilter, SearchRequest, SortField, SortOrder};
pub use reconcile::{ChallengeSource, ReconcileReport, Reconciler};
pub use service::ChallengeIndex;
pub use sorter::ResultSorter;
pub use writer::{IndexArtifacts, IndexWriter};
