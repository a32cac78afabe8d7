//! The external reasoning seam.
//!
//! The orchestrator only ever talks to a [`Reasoner`]: one call that turns a
//! free-text query into catalog constraints and one that picks and explains
//! the best candidates.  [`LlmReasoner`] implements both on top of
//! [`LlmDriver`]; [`ScriptedReasoner`][crate::scripted::ScriptedReasoner]
//! is the deterministic stand-in used by tests.

use async_trait::async_trait;
use platewise_types::{Constraint, Dish, PlateError, RecommendationItem};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm_driver::{ChatMessage, LlmDriver, ResponseSchema};

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of constraint derivation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Derivation {
    /// `false` when the query needs no catalog narrowing at all (e.g. "what
    /// did I order last time?").
    pub search_catalog: bool,
    pub constraints: Vec<Constraint>,
    /// Raw JSON of constraint entries that could not be parsed.
    pub skipped: Vec<String>,
}

impl Derivation {
    /// Search the whole catalog, unfiltered.
    pub fn full_catalog() -> Self {
        Self {
            search_catalog: true,
            ..Self::default()
        }
    }

    pub fn with_constraints(constraints: Vec<Constraint>) -> Self {
        Self {
            search_catalog: true,
            constraints,
            skipped: Vec::new(),
        }
    }
}

/// Outcome of ranking: picks best-first plus an overall explanation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ranking {
    pub picks: Vec<RecommendationItem>,
    pub summary: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reasoner trait
// ─────────────────────────────────────────────────────────────────────────────

/// The two logical operations of the reasoning service.  Both are treated
/// as unreliable: callers bound them with a timeout and fall back on error.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Turn `query` (plus the user's preference summary) into constraints.
    async fn derive_constraints(
        &self,
        query: &str,
        preferences: &str,
    ) -> Result<Derivation, PlateError>;

    /// Select and order up to five of `candidates`, best first.
    async fn rank(
        &self,
        candidates: &[Dish],
        query: &str,
        preferences: &str,
    ) -> Result<Ranking, PlateError>;
}

/// Shared reasoners, so a caller can keep a handle on the one it gave away.
#[async_trait]
impl<R: Reasoner + ?Sized> Reasoner for std::sync::Arc<R> {
    async fn derive_constraints(
        &self,
        query: &str,
        preferences: &str,
    ) -> Result<Derivation, PlateError> {
        (**self).derive_constraints(query, preferences).await
    }

    async fn rank(
        &self,
        candidates: &[Dish],
        query: &str,
        preferences: &str,
    ) -> Result<Ranking, PlateError> {
        (**self).rank(candidates, query, preferences).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────────────────────────

/// What the derive call is asked to return.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DeriveReply {
    /// Whether the catalog should be searched at all.
    search_catalog: bool,
    constraints: Vec<Constraint>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct RankPick {
    dish_id: String,
    rationale: String,
}

/// What the rank call is asked to return.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct RankReply {
    picks: Vec<RankPick>,
    #[serde(default)]
    summary: String,
}

/// Slice out the JSON object in `reply`, tolerating Markdown code fences and
/// chatter around it.
pub fn extract_json(reply: &str) -> Option<&str> {
    let text = reply.trim();
    let text = match text.find("```") {
        Some(open) => {
            let after = &text[open + 3..];
            // Skip an info string such as `json`.
            let body = after.find('\n').map_or(after, |nl| &after[nl + 1..]);
            body.find("```").map_or(body, |close| &body[..close])
        }
        None => text,
    };
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_object(reply: &str, call: &str) -> Result<Value, PlateError> {
    let json = extract_json(reply).ok_or_else(|| {
        PlateError::ExternalService(format!("{call}: reply contained no JSON object"))
    })?;
    serde_json::from_str(json)
        .map_err(|e| PlateError::ExternalService(format!("{call}: unparseable reply: {e}")))
}

/// Parse a derive reply entry by entry so that one malformed constraint
/// does not discard the others.
pub fn parse_derivation(reply: &str) -> Result<Derivation, PlateError> {
    let value = parse_object(reply, "derive_constraints")?;
    let search_catalog = value
        .get("search_catalog")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let mut derivation = Derivation {
        search_catalog,
        ..Derivation::default()
    };
    let Some(entries) = value.get("constraints") else {
        return Ok(derivation);
    };
    let Some(entries) = entries.as_array() else {
        return Err(PlateError::ExternalService(
            "derive_constraints: `constraints` is not a list".into(),
        ));
    };
    for entry in entries {
        match serde_json::from_value::<Constraint>(entry.clone()) {
            Ok(c) => derivation.constraints.push(c),
            Err(e) => {
                warn!(entry = %entry, error = %e, "skipping malformed constraint");
                derivation.skipped.push(entry.to_string());
            }
        }
    }
    Ok(derivation)
}

pub fn parse_ranking(reply: &str) -> Result<Ranking, PlateError> {
    let value = parse_object(reply, "rank")?;
    let reply: RankReply = serde_json::from_value(value)
        .map_err(|e| PlateError::ExternalService(format!("rank: schema mismatch: {e}")))?;
    Ok(Ranking {
        picks: reply
            .picks
            .into_iter()
            .map(|p| RecommendationItem {
                dish_id: p.dish_id,
                rationale: p.rationale,
            })
            .collect(),
        summary: reply.summary,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmReasoner
// ─────────────────────────────────────────────────────────────────────────────

const DERIVE_PROMPT: &str = "\
You turn food requests into catalog filters.
Catalog fields: id, name, restaurant, cuisine, category, price (INR), rating (0-5), \
dietary_tags (set, e.g. Vegetarian / Non-Vegetarian), spice_level (None/Low/Medium/High), \
prep_time_mins, tags (set, e.g. Spicy, Quick, Healthy, Sweet), description.
Operators: `equals` (text or number), `range` with value [min, max] (numeric fields only, \
use null for an open side), `in_set` with a list of values.
Reply as {\"search_catalog\": bool, \"constraints\": [{\"field\", \"op\", \"value\"}]}.
Set search_catalog to false when the request is about the user's history rather than food.
Only add constraints the request or the user's stated preferences clearly imply.";

const RANK_PROMPT: &str = "\
You are a food recommender. From the candidate dishes pick up to five that best fit the \
request and the user's history, best first.
Reply as {\"picks\": [{\"dish_id\", \"rationale\"}], \"summary\"}.";

/// [`Reasoner`] backed by a chat-completions model.
#[derive(Debug)]
pub struct LlmReasoner {
    driver: LlmDriver,
}

impl LlmReasoner {
    pub fn new(driver: LlmDriver) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &LlmDriver {
        &self.driver
    }
}

fn candidate_lines(candidates: &[Dish]) -> String {
    candidates
        .iter()
        .map(|d| {
            serde_json::json!({
                "id": d.id,
                "name": d.name,
                "restaurant": d.restaurant,
                "cuisine": d.cuisine,
                "price": d.price,
                "rating": d.rating,
                "dietary_tags": d.dietary_tags,
                "spice_level": d.spice_level,
                "tags": d.tags,
                "description": d.description,
            })
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn derive_constraints(
        &self,
        query: &str,
        preferences: &str,
    ) -> Result<Derivation, PlateError> {
        let messages = [
            ChatMessage::system(format!("{DERIVE_PROMPT}\n\n## User history\n{preferences}")),
            ChatMessage::user(query),
        ];
        let schema = ResponseSchema::of::<DeriveReply>("catalog_filters");
        let reply = self.driver.complete(&messages, Some(&schema)).await?;
        debug!(reply = %reply, "derive reply");
        parse_derivation(&reply)
    }

    async fn rank(
        &self,
        candidates: &[Dish],
        query: &str,
        preferences: &str,
    ) -> Result<Ranking, PlateError> {
        let messages = [
            ChatMessage::system(format!(
                "{RANK_PROMPT}\n\n## User history\n{preferences}\n\n## Candidates\n{}",
                candidate_lines(candidates)
            )),
            ChatMessage::user(query),
        ];
        let schema = ResponseSchema::of::<RankReply>("ranked_dishes");
        let reply = self.driver.complete(&messages, Some(&schema)).await?;
        debug!(reply = %reply, "rank reply");
        parse_ranking(&reply)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
