use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use validator::{Validate, ValidationError};

/// Whitespace-only values would normalize to an empty facet value
fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// A challenge as handed over by the record store.
///
/// Only the fields below are read by the index; anything else in the
/// payload is kept in `extra` and round-trips through the raw data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Challenge {
    /// Unique identifier
    #[validate(length(min = 1, max = 255), custom(function = "not_blank"))]
    pub challenge_id: String,

    /// Title
    #[validate(length(min = 1, max = 500), custom(function = "not_blank"))]
    pub name: String,

    /// Primary category
    #[validate(length(min = 1, max = 255), custom(function = "not_blank"))]
    pub challenge_type: String,

    /// Platform tags
    #[serde(default)]
    pub platforms: Vec<String>,

    /// Technology tags
    #[serde(default)]
    pub technologies: Vec<String>,

    /// Open for submissions or not
    pub state: ChallengeState,

    /// Total prize money in whole currency units
    #[serde(default)]
    pub total_prize_money: u64,

    /// Number of registered participants
    #[serde(default)]
    pub participant_count: u64,

    /// Owning community, if any
    #[serde(default)]
    pub community_name: Option<String>,

    /// Submission deadline
    pub end_date: DateTime<Utc>,

    /// Remaining payload fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Challenge {
    /// Create a challenge with the required attributes and no tags
    pub fn new(
        challenge_id: impl Into<String>,
        name: impl Into<String>,
        challenge_type: impl Into<String>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            challenge_id: challenge_id.into(),
            name: name.into(),
            challenge_type: challenge_type.into(),
            platforms: Vec::new(),
            technologies: Vec::new(),
            state: ChallengeState::Open,
            total_prize_money: 0,
            participant_count: 0,
            community_name: None,
            end_date,
            extra: Map::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ChallengeState::Open
    }

    /// Community name if one is set and not blank
    pub fn community(&self) -> Option<&str> {
        self.community_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Free text the keyword index is built from
    pub fn keyword_sources(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.platforms.iter().map(String::as_str))
            .chain(self.technologies.iter().map(String::as_str))
            .chain(self.community())
    }

    /// End date in a form that sorts lexically
    pub fn end_date_key(&self) -> String {
        self.end_date.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChallengeState {
    Open,
    Closed,
}
