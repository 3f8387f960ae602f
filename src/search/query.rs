//! Search request model and filter parsing

use crate::config::RangeBounds;
use crate::error::{AppError, Result};
use crate::models::ChallengeState;
use crate::search::keys::normalize_value;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

/// Filterable dimensions of a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Facet {
    Query,
    #[strum(to_string = "categories", serialize = "category")]
    Categories,
    Platforms,
    Technologies,
    Community,
    State,
    PrizeMoney,
    Participants,
}

/// Fields results can be ordered by
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortField {
    Title,
    EndDate,
    PrizeMoney,
    Participants,
    #[serde(alias = "challenge_type")]
    #[strum(to_string = "category", serialize = "challenge_type")]
    Category,
}

impl SortField {
    /// Compared lexically rather than numerically
    pub fn is_alpha(self) -> bool {
        matches!(self, SortField::Title | SortField::EndDate | SortField::Category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl From<&str> for SortOrder {
    /// Anything but "desc" (in any case) sorts ascending
    fn from(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }
}

impl From<String> for SortOrder {
    fn from(value: String) -> Self {
        SortOrder::from(value.as_str())
    }
}

/// Exact value or inclusive range over a numeric facet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NumericFilter {
    Exact(u64),
    Range { min: Option<u64>, max: Option<u64> },
}

impl NumericFilter {
    pub fn range(min: Option<u64>, max: Option<u64>) -> Self {
        NumericFilter::Range { min, max }
    }

    /// A range with neither bound filters nothing
    pub fn is_blank(&self) -> bool {
        matches!(self, NumericFilter::Range { min: None, max: None })
    }

    /// Inclusive bounds, filling omitted sides from `defaults`
    pub fn bounds(&self, defaults: RangeBounds) -> (u64, u64) {
        match *self {
            NumericFilter::Exact(value) => (value, value),
            NumericFilter::Range { min, max } => {
                (min.unwrap_or(defaults.min), max.unwrap_or(defaults.max))
            }
        }
    }
}

/// One normalized, non-blank filter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetFilter {
    Query(String),
    Categories(Vec<String>),
    Platforms(Vec<String>),
    Technologies(Vec<String>),
    Community(String),
    State(ChallengeState),
    PrizeMoney(NumericFilter),
    Participants(NumericFilter),
}

impl FacetFilter {
    pub fn facet(&self) -> Facet {
        match self {
            FacetFilter::Query(_) => Facet::Query,
            FacetFilter::Categories(_) => Facet::Categories,
            FacetFilter::Platforms(_) => Facet::Platforms,
            FacetFilter::Technologies(_) => Facet::Technologies,
            FacetFilter::Community(_) => Facet::Community,
            FacetFilter::State(_) => Facet::State,
            FacetFilter::PrizeMoney(_) => Facet::PrizeMoney,
            FacetFilter::Participants(_) => Facet::Participants,
        }
    }
}

/// A search over the challenge index
///
/// Filters on different facets are ANDed; values within one list facet are ORed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub categories: Vec<String>,
    pub platforms: Vec<String>,
    pub technologies: Vec<String>,
    pub community: Option<String>,
    pub state: Option<ChallengeState>,
    pub prize_money: Option<NumericFilter>,
    pub participants: Option<NumericFilter>,
    pub sort_by: Option<SortField>,
    pub order: SortOrder,
}

fn owned<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

/// Lowercased, trimmed, sorted and deduplicated; blanks dropped
fn normalize_list(values: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = values
        .iter()
        .map(|value| normalize_value(value))
        .filter(|value| !value.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = owned(categories);
        self
    }

    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = owned(platforms);
        self
    }

    pub fn with_technologies<I, S>(mut self, technologies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.technologies = owned(technologies);
        self
    }

    pub fn with_community(mut self, community: impl Into<String>) -> Self {
        self.community = Some(community.into());
        self
    }

    pub fn with_state(mut self, state: ChallengeState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_prize_money(mut self, filter: NumericFilter) -> Self {
        self.prize_money = Some(filter);
        self
    }

    pub fn with_participants(mut self, filter: NumericFilter) -> Self {
        self.participants = Some(filter);
        self
    }

    pub fn sort_by(mut self, field: SortField) -> Self {
        self.sort_by = Some(field);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// The non-blank filters of this request, normalized, in facet order
    pub fn facet_filters(&self) -> Vec<FacetFilter> {
        let mut filters = Vec::new();

        if let Some(query) = non_blank(&self.query) {
            let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
            filters.push(FacetFilter::Query(words.join(" ")));
        }

        let lists: [(&Vec<String>, fn(Vec<String>) -> FacetFilter); 3] = [
            (&self.categories, FacetFilter::Categories),
            (&self.platforms, FacetFilter::Platforms),
            (&self.technologies, FacetFilter::Technologies),
        ];
        for (values, wrap) in lists {
            let normalized = normalize_list(values);
            if !normalized.is_empty() {
                filters.push(wrap(normalized));
            }
        }

        if let Some(community) = non_blank(&self.community) {
            filters.push(FacetFilter::Community(normalize_value(community)));
        }

        if let Some(state) = self.state {
            filters.push(FacetFilter::State(state));
        }

        if let Some(filter) = self.prize_money.filter(|f| !f.is_blank()) {
            filters.push(FacetFilter::PrizeMoney(filter));
        }

        if let Some(filter) = self.participants.filter(|f| !f.is_blank()) {
            filters.push(FacetFilter::Participants(filter));
        }

        filters
    }

    /// Build a request from loosely typed parameters such as
    /// `{"platforms": ["heroku"], "prize_money": {"min": 1000}, "sort_by": "title"}`.
    ///
    /// Unknown names are rejected; null, empty strings and empty lists are
    /// treated as absent.
    pub fn from_params(params: &Value) -> Result<Self> {
        let object = params.as_object().ok_or_else(|| {
            AppError::Validation("search parameters must be a JSON object".to_string())
        })?;

        let mut request = SearchRequest::default();
        for (name, value) in object {
            match name.as_str() {
                "sort_by" => {
                    request.sort_by = parse_text("sort_by", value)?
                        .map(|field| {
                            SortField::from_str(&field).map_err(|_| invalid("sort_by", "unknown sort field"))
                        })
                        .transpose()?;
                }
                "order" => {
                    request.order = parse_text("order", value)?
                        .map(SortOrder::from)
                        .unwrap_or_default();
                }
                _ => {
                    let facet = Facet::from_str(name)
                        .map_err(|_| AppError::UnknownFilter(name.clone()))?;
                    request.set_param(facet, value)?;
                }
            }
        }

        Ok(request)
    }

    fn set_param(&mut self, facet: Facet, value: &Value) -> Result<()> {
        let name = facet.to_string();
        match facet {
            Facet::Query => self.query = parse_text(&name, value)?,
            Facet::Categories => self.categories = parse_list(&name, value)?,
            Facet::Platforms => self.platforms = parse_list(&name, value)?,
            Facet::Technologies => self.technologies = parse_list(&name, value)?,
            Facet::Community => self.community = parse_text(&name, value)?,
            Facet::State => {
                self.state = parse_text(&name, value)?
                    .map(|state| {
                        ChallengeState::from_str(&state)
                            .map_err(|_| invalid(&name, "expected 'open' or 'closed'"))
                    })
                    .transpose()?
            }
            Facet::PrizeMoney => self.prize_money = parse_numeric(&name, value)?,
            Facet::Participants => self.participants = parse_numeric(&name, value)?,
        }
        Ok(())
    }
}

fn invalid(facet: &str, message: &str) -> AppError {
    AppError::InvalidFilter {
        facet: facet.to_string(),
        message: message.to_string(),
    }
}

fn parse_text(facet: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        _ => Err(invalid(facet, "expected a string")),
    }
}

fn parse_list(facet: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(_) => Ok(parse_text(facet, value)?.into_iter().collect()),
        Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                if let Some(text) = parse_text(facet, item)? {
                    values.push(text);
                }
            }
            Ok(values)
        }
        _ => Err(invalid(facet, "expected a list of strings")),
    }
}

/// Non-negative integer from a JSON number or numeric string
fn parse_bound(facet: &str, value: &Value) -> Result<Option<u64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => {
            if let Some(n) = number.as_u64() {
                return Ok(Some(n));
            }
            match number.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(Some(f as u64)),
                _ => Err(invalid(facet, "expected a non-negative whole number")),
            }
        }
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid(facet, "expected a non-negative whole number")),
        _ => Err(invalid(facet, "expected a number")),
    }
}

fn parse_numeric(facet: &str, value: &Value) -> Result<Option<NumericFilter>> {
    match value {
        Value::Object(range) => {
            let mut min = None;
            let mut max = None;
            for (bound, value) in range {
                match bound.as_str() {
                    "min" => min = parse_bound(facet, value)?,
                    "max" => max = parse_bound(facet, value)?,
                    other => {
                        return Err(invalid(
                            facet,
                            &format!("unexpected range bound '{}'", other),
                        ))
                    }
                }
            }
            let filter = NumericFilter::range(min, max);
            Ok((!filter.is_blank()).then_some(filter))
        }
        _ => Ok(parse_bound(facet, value)?.map(NumericFilter::Exact)),
    }
}
