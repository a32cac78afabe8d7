//! `platewise-types` – shared data model and error taxonomy.
//!
//! Every other platewise crate speaks in these types: the immutable [`Dish`]
//! owned by the catalog, the per-query [`Constraint`] produced by the
//! reasoning step, the [`Recommendation`] handed to the UI, the [`Feedback`]
//! coming back from it, and the single [`PlateError`] enum.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the number of dishes a single recommendation may contain.
pub const MAX_RECOMMENDATIONS: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Dish
// ─────────────────────────────────────────────────────────────────────────────

/// One row of the food catalog.  Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dish {
    /// Stable catalog identifier (e.g. `"D004"`).
    pub id: String,
    pub name: String,
    pub restaurant: String,
    pub cuisine: String,
    /// Menu section such as `"Main Course"` or `"Dessert"`.
    pub category: String,
    pub price: f64,
    /// Average user rating on a 0–5 scale.
    pub rating: f64,
    /// Dietary labels such as `"Vegetarian"`.
    pub dietary_tags: BTreeSet<String>,
    pub spice_level: String,
    pub prep_time_mins: u32,
    /// Flavour / style labels such as `"Creamy"` or `"Quick"`.
    pub tags: BTreeSet<String>,
    pub description: String,
}

impl Dish {
    /// Build a dish with the required fields; optional columns start empty.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        cuisine: impl Into<String>,
        price: f64,
        rating: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            restaurant: String::new(),
            cuisine: cuisine.into(),
            category: String::new(),
            price,
            rating,
            dietary_tags: BTreeSet::new(),
            spice_level: String::new(),
            prep_time_mins: 0,
            tags: BTreeSet::new(),
            description: String::new(),
        }
    }

    /// Builder-style setter for [`Dish::dietary_tags`].
    pub fn with_dietary_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dietary_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style setter for [`Dish::tags`].
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Builder-style setter for [`Dish::restaurant`].
    pub fn with_restaurant(mut self, restaurant: impl Into<String>) -> Self {
        self.restaurant = restaurant.into();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Constraint
// ─────────────────────────────────────────────────────────────────────────────

/// Comparison applied by a [`Constraint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Case-insensitive equality for text, tag membership for set fields.
    Equals,
    /// Inclusive numeric `[min, max]`; either bound may be `null`.
    Range,
    /// Value is one of the listed members.
    InSet,
}

/// Right-hand side of a [`Constraint`], in the shape the reasoning service
/// emits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ConstraintValue {
    Number(f64),
    Text(String),
    /// A numeric list; used for `range` bounds and numeric `in_set`.
    Numbers(Vec<Option<f64>>),
    Texts(Vec<String>),
}

/// A single declarative filter condition.  Produced per query, consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Constraint {
    /// Dish field name, e.g. `"price"` or `"dietary_tags"`.
    pub field: String,
    pub op: Operator,
    pub value: ConstraintValue,
}

impl Constraint {
    /// `field == value`.
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: Operator::Equals,
            value: ConstraintValue::Text(value.into()),
        }
    }

    /// `min <= field <= max`; `None` leaves that side open.
    pub fn range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            field: field.into(),
            op: Operator::Range,
            value: ConstraintValue::Numbers(vec![min, max]),
        }
    }

    /// `field ∈ values`.
    pub fn in_set<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field: field.into(),
            op: Operator::InSet,
            value: ConstraintValue::Texts(values.into_iter().map(Into::into).collect()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recommendation
// ─────────────────────────────────────────────────────────────────────────────

/// One recommended dish and the reason it was picked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub dish_id: String,
    pub rationale: String,
}

/// A step of the recommendation flow that ran in a degraded mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum Fallback {
    /// Constraint derivation failed; the full catalog was used.
    ConstraintsUnavailable(String),
    /// One derived constraint was invalid and skipped.
    ConstraintDropped(String),
    /// Ranking failed; candidates were ordered by rating.
    RankingUnavailable(String),
    /// The stored memory record could not be read; a fresh one was used.
    MemoryUnavailable(String),
    /// The updated memory record could not be written.
    MemoryNotPersisted(String),
}

/// Ranked answer to one query.  Ephemeral, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Ordered best-first, at most [`MAX_RECOMMENDATIONS`] long.
    pub items: Vec<RecommendationItem>,
    /// Overall explanation shown above the list.
    pub rationale: String,
    /// Constraints that were actually applied to the catalog.
    pub constraints: Vec<Constraint>,
    pub fallbacks: Vec<Fallback>,
}

impl Recommendation {
    /// The recommended dish ids, best first.
    pub fn dish_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.dish_id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feedback
// ─────────────────────────────────────────────────────────────────────────────

/// Direction of a feedback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Like,
    Dislike,
}

impl Signal {
    /// Affinity delta applied to the dish's cuisine and tags.
    pub fn delta(self) -> i32 {
        match self {
            Signal::Like => 1,
            Signal::Dislike => -1,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Like => write!(f, "like"),
            Signal::Dislike => write!(f, "dislike"),
        }
    }
}

/// User feedback on a dish that was shown to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub signal: Signal,
    /// Optional 1–5 star rating.
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Feedback {
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            rating: None,
            comment: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn like() -> Self {
        Self::new(Signal::Like)
    }

    pub fn dislike() -> Self {
        Self::new(Signal::Dislike)
    }

    /// Attach a rating, clamped to the 1–5 scale.  A non-finite rating
    /// leaves the feedback unrated.
    pub fn with_rating(mut self, rating: f32) -> Self {
        self.rating = rating.is_finite().then(|| rating.clamp(1.0, 5.0));
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type.  Only [`PlateError::DataLoad`] and
/// [`PlateError::Initialization`] are fatal; every other kind is recovered
/// from with degraded personalization.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlateError {
    #[error("Catalog load failed: {0}")]
    DataLoad(String),

    #[error("Invalid constraint on `{field}`: {reason}")]
    InvalidConstraint { field: String, reason: String },

    #[error("Reasoning service error: {0}")]
    ExternalService(String),

    #[error("Memory write failed: {0}")]
    MemoryWrite(String),

    #[error("Memory read failed: {0}")]
    MemoryRead(String),

    #[error("Feedback target `{0}` was not among the last shown dishes")]
    UnknownFeedbackTarget(String),

    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl PlateError {
    pub fn invalid_constraint(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlateError::InvalidConstraint {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// `true` for the kinds that must abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlateError::DataLoad(_) | PlateError::Initialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_constraint_parses_from_wire_form() {
        let json = r#"{"field":"price","op":"range","value":[0,200]}"#;
        let c: Constraint = serde_json::from_str(json).unwrap();
        assert_eq!(c.op, Operator::Range);
        assert_eq!(c.value, ConstraintValue::Numbers(vec![Some(0.0), Some(200.0)]));
    }

    #[test]
    fn open_range_bound_parses_as_none() {
        let json = r#"{"field":"rating","op":"range","value":[4.5,null]}"#;
        let c: Constraint = serde_json::from_str(json).unwrap();
        assert_eq!(c.value, ConstraintValue::Numbers(vec![Some(4.5), None]));
    }

    #[test]
    fn string_list_parses_as_texts() {
        let json = r#"{"field":"dietary_tags","op":"in_set","value":["Vegetarian","vegan"]}"#;
        let c: Constraint = serde_json::from_str(json).unwrap();
        assert_eq!(c, Constraint::in_set("dietary_tags", ["Vegetarian", "vegan"]));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let json = r#"{"field":"price","op":"less_than","value":200}"#;
        assert!(serde_json::from_str::<Constraint>(json).is_err());
    }

    #[test]
    fn fallback_serializes_with_kind_tag() {
        let f = Fallback::RankingUnavailable("timeout".into());
        let json = serde_json::to_string(&f).unwrap();
        assert!(json.contains("\"kind\":\"ranking_unavailable\""));
        assert!(json.contains("timeout"));
    }

    #[test]
    fn recommendation_dish_ids_preserve_order() {
        let rec = Recommendation {
            items: vec![
                RecommendationItem { dish_id: "D2".into(), rationale: String::new() },
                RecommendationItem { dish_id: "D1".into(), rationale: String::new() },
            ],
            ..Default::default()
        };
        assert_eq!(rec.dish_ids(), vec!["D2".to_string(), "D1".to_string()]);
    }

    #[test]
    fn feedback_rating_is_clamped() {
        assert_eq!(Feedback::like().with_rating(9.0).rating, Some(5.0));
        assert_eq!(Feedback::dislike().with_rating(0.0).rating, Some(1.0));
    }

    #[test]
    fn non_finite_rating_is_dropped() {
        assert_eq!(Feedback::like().with_rating(f32::NAN).rating, None);
        assert_eq!(Feedback::like().with_rating(f32::INFINITY).rating, None);
        let json = serde_json::to_string(&Feedback::like().with_rating(f32::NAN)).unwrap();
        let back: Feedback = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rating, None);
    }

    #[test]
    fn only_load_and_init_errors_are_fatal() {
        assert!(PlateError::DataLoad("x".into()).is_fatal());
        assert!(PlateError::Initialization("x".into()).is_fatal());
        assert!(!PlateError::ExternalService("x".into()).is_fatal());
        assert!(!PlateError::MemoryWrite("x".into()).is_fatal());
        assert!(!PlateError::UnknownFeedbackTarget("D9".into()).is_fatal());
    }

    #[test]
    fn plate_error_display() {
        let err = PlateError::invalid_constraint("colour", "unknown field");
        assert!(err.to_string().contains("colour"));
        let err2 = PlateError::UnknownFeedbackTarget("D042".into());
        assert!(err2.to_string().contains("D042"));
    }
}
