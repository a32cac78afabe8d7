//! [`MemoryRecord`] – one user's active and permanent memory.
//!
//! # Scopes
//!
//! | scope                         | lifetime                  | written by                 |
//! |-------------------------------|---------------------------|----------------------------|
//! | [`ActiveMemory`]              | current process only      | every `recommend`          |
//! | [`PermanentMemory`]           | survives restarts         | feedback, explicit prefs   |
//!
//! Both scopes are serialised together so a save → load round-trip is exact;
//! it is the orchestrator that discards `active` when a user is first seen by
//! a new process.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use platewise_types::{Dish, Feedback, Signal};
use serde::{Deserialize, Serialize};

/// Detailed feedback entries kept before the oldest is folded into the
/// consolidated summary.
pub const MAX_RECENT_FEEDBACK: usize = 10;

/// Orders listed in [`MemoryRecord::summary`].
const SUMMARY_ORDERS: usize = 5;

const CONSOLIDATED_HEADER: &str = "Older feedback summary:";
const NO_HISTORY: &str = "No previous history.";

// ─────────────────────────────────────────────────────────────────────────────
// Entries
// ─────────────────────────────────────────────────────────────────────────────

/// A dish the user ordered (gave feedback on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub dish_id: String,
    pub dish_name: String,
    #[serde(default)]
    pub restaurant: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl OrderEntry {
    pub fn for_dish(dish: &Dish, timestamp: DateTime<Utc>) -> Self {
        Self {
            dish_id: dish.id.clone(),
            dish_name: dish.name.clone(),
            restaurant: dish.restaurant.clone(),
            price: dish.price,
            timestamp,
        }
    }
}

/// Detailed record of one feedback event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub dish_id: String,
    pub dish_name: String,
    pub signal: Signal,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEntry {
    pub fn for_dish(dish: &Dish, feedback: &Feedback) -> Self {
        Self {
            dish_id: dish.id.clone(),
            dish_name: dish.name.clone(),
            signal: feedback.signal,
            rating: feedback.rating,
            comment: feedback.comment.clone(),
            timestamp: feedback.timestamp,
        }
    }

    /// `name: comment (rating 4/5) - 2024-05-01`.  Without a comment the
    /// signal stands in for it; without a rating the parenthesis names the
    /// signal instead.
    fn line(&self) -> String {
        let comment = if self.comment.trim().is_empty() {
            self.signal.to_string()
        } else {
            self.comment.trim().to_string()
        };
        let score = match self.rating {
            Some(r) => format!("rating {r}/5"),
            None => self.signal.to_string(),
        };
        format!(
            "{}: {comment} ({score}) - {}",
            self.dish_name,
            self.timestamp.format("%Y-%m-%d")
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scopes
// ─────────────────────────────────────────────────────────────────────────────

/// Session-scoped signals.  Never trusted across restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveMemory {
    pub last_query: Option<String>,
    /// Dish ids of the most recent recommendation, best first.
    pub last_shown: Vec<String>,
    pub query_count: u32,
}

/// Durable preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermanentMemory {
    /// Free-form stated preferences (`dietary`, `budget_range`, ...).
    pub preferences: BTreeMap<String, String>,
    pub price_ceiling: Option<f64>,
    pub cuisine_affinity: BTreeMap<String, i32>,
    /// Affinity per dietary label and flavour tag.
    pub tag_affinity: BTreeMap<String, i32>,
    pub order_history: Vec<OrderEntry>,
    /// At most [`MAX_RECENT_FEEDBACK`] entries, oldest first.
    pub recent_feedback: Vec<FeedbackEntry>,
    pub consolidated_feedback: String,
}

impl PermanentMemory {
    /// `true` when nothing has been learned about the user yet.
    pub fn is_empty(&self) -> bool {
        self.preferences.is_empty()
            && self.price_ceiling.is_none()
            && self.cuisine_affinity.is_empty()
            && self.tag_affinity.is_empty()
            && self.order_history.is_empty()
            && self.recent_feedback.is_empty()
            && self.consolidated_feedback.is_empty()
    }

    /// Cuisines with a positive affinity, strongest first.
    pub fn preferred_cuisines(&self) -> Vec<String> {
        let mut liked: Vec<(&String, i32)> = self
            .cuisine_affinity
            .iter()
            .filter(|(_, score)| **score > 0)
            .map(|(c, s)| (c, *s))
            .collect();
        // Stable sort keeps alphabetical order among equal scores.
        liked.sort_by(|a, b| b.1.cmp(&a.1));
        liked.into_iter().map(|(c, _)| c.clone()).collect()
    }

    /// Tags with a negative affinity, most disliked first.
    pub fn disliked_tags(&self) -> Vec<String> {
        let mut disliked: Vec<(&String, i32)> = self
            .tag_affinity
            .iter()
            .filter(|(_, score)| **score < 0)
            .map(|(t, s)| (t, *s))
            .collect();
        disliked.sort_by(|a, b| a.1.cmp(&b.1));
        disliked.into_iter().map(|(t, _)| t.clone()).collect()
    }

    fn push_feedback(&mut self, entry: FeedbackEntry) {
        self.recent_feedback.push(entry);
        while self.recent_feedback.len() > MAX_RECENT_FEEDBACK {
            let oldest = self.recent_feedback.remove(0);
            if self.consolidated_feedback.is_empty() {
                self.consolidated_feedback.push_str(CONSOLIDATED_HEADER);
            }
            self.consolidated_feedback.push_str("\n• ");
            self.consolidated_feedback.push_str(&oldest.line());
        }
    }

    fn adjust_affinity(&mut self, dish: &Dish, delta: i32) {
        *self.cuisine_affinity.entry(dish.cuisine.clone()).or_insert(0) += delta;
        for tag in dish.dietary_tags.iter().chain(dish.tags.iter()) {
            *self.tag_affinity.entry(tag.clone()).or_insert(0) += delta;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Updates
// ─────────────────────────────────────────────────────────────────────────────

/// Mutation of [`ActiveMemory`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveSignal {
    /// A new query was asked; also bumps the query count.
    Query(String),
    /// These dish ids were just shown, best first.
    Shown(Vec<String>),
    /// Forget everything session-scoped.
    Reset,
}

/// Mutation of [`PermanentMemory`].
#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceUpdate {
    /// Set a free-form stated preference.
    Set { key: String, value: String },
    PriceCeiling(Option<f64>),
    /// Feedback on a dish: adjusts cuisine and tag affinity, appends the
    /// feedback entry and records the order.
    Feedback { dish: Dish, feedback: Feedback },
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryRecord
// ─────────────────────────────────────────────────────────────────────────────

/// Everything remembered about one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub user_id: String,
    #[serde(default)]
    pub active: ActiveMemory,
    #[serde(default)]
    pub permanent: PermanentMemory,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// An empty but valid record.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            active: ActiveMemory::default(),
            permanent: PermanentMemory::default(),
            created_at: Utc::now(),
        }
    }

    pub fn apply_active(&mut self, signal: ActiveSignal) {
        match signal {
            ActiveSignal::Query(q) => {
                self.active.last_query = Some(q);
                self.active.query_count = self.active.query_count.saturating_add(1);
            }
            ActiveSignal::Shown(ids) => self.active.last_shown = ids,
            ActiveSignal::Reset => self.active = ActiveMemory::default(),
        }
    }

    pub fn apply_permanent(&mut self, update: PreferenceUpdate) {
        let permanent = &mut self.permanent;
        match update {
            PreferenceUpdate::Set { key, value } => {
                permanent.preferences.insert(key, value);
            }
            PreferenceUpdate::PriceCeiling(ceiling) => permanent.price_ceiling = ceiling,
            PreferenceUpdate::Feedback { dish, feedback } => {
                permanent.adjust_affinity(&dish, feedback.signal.delta());
                permanent
                    .order_history
                    .push(OrderEntry::for_dish(&dish, feedback.timestamp));
                permanent.push_feedback(FeedbackEntry::for_dish(&dish, &feedback));
            }
        }
    }

    /// `true` when `dish_id` was part of the most recent recommendation.
    pub fn was_shown(&self, dish_id: &str) -> bool {
        self.active.last_shown.iter().any(|id| id == dish_id)
    }

    /// Preference context handed to the reasoning service.
    pub fn summary(&self) -> String {
        let p = &self.permanent;
        if p.is_empty() {
            return NO_HISTORY.to_string();
        }

        let mut out = String::new();
        if !p.preferences.is_empty() {
            out.push_str("User Preferences:\n");
            for (k, v) in &p.preferences {
                let _ = writeln!(out, "  - {k}: {v}");
            }
        }
        if let Some(ceiling) = p.price_ceiling {
            let _ = writeln!(out, "Price ceiling: {ceiling}");
        }
        let cuisines = p.preferred_cuisines();
        if !cuisines.is_empty() {
            let _ = writeln!(out, "Favourite cuisines: {}", cuisines.join(", "));
        }
        let disliked = p.disliked_tags();
        if !disliked.is_empty() {
            let _ = writeln!(out, "Disliked tags: {}", disliked.join(", "));
        }
        if !p.order_history.is_empty() {
            let _ = writeln!(out, "\nOrder History (Total: {} orders):", p.order_history.len());
            let skip = p.order_history.len().saturating_sub(SUMMARY_ORDERS);
            for order in &p.order_history[skip..] {
                let _ = writeln!(
                    out,
                    "  - {} from {} on {}",
                    order.dish_name,
                    order.restaurant,
                    order.timestamp.format("%Y-%m-%d")
                );
            }
        }
        if !p.recent_feedback.is_empty() {
            let _ = writeln!(
                out,
                "\nRecent Feedback (Last {} items):",
                p.recent_feedback.len()
            );
            for fb in &p.recent_feedback {
                let _ = writeln!(out, "  - {}", fb.line());
            }
        }
        if !p.consolidated_feedback.is_empty() {
            let _ = writeln!(out, "\n{}", p.consolidated_feedback);
        }
        out.trim_end().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn noodles() -> Dish {
        Dish::new("D005", "Veg Hakka Noodles", "Chinese", 180.0, 4.2)
            .with_restaurant("Wok Express")
            .with_dietary_tags(["Vegetarian"])
            .with_tags(["Quick", "Light"])
    }

    fn feedback_on(record: &mut MemoryRecord, dish: Dish, feedback: Feedback) {
        record.apply_permanent(PreferenceUpdate::Feedback { dish, feedback });
    }

    #[test]
    fn new_record_is_empty() {
        let r = MemoryRecord::new("alice");
        assert_eq!(r.user_id, "alice");
        assert!(r.permanent.is_empty());
        assert_eq!(r.active, ActiveMemory::default());
        assert_eq!(r.summary(), "No previous history.");
    }

    #[test]
    fn query_signal_sets_last_query_and_counts() {
        let mut r = MemoryRecord::new("u");
        r.apply_active(ActiveSignal::Query("spicy".into()));
        r.apply_active(ActiveSignal::Query("sweet".into()));
        assert_eq!(r.active.last_query.as_deref(), Some("sweet"));
        assert_eq!(r.active.query_count, 2);
        assert!(r.permanent.is_empty());
    }

    #[test]
    fn reset_clears_active_only() {
        let mut r = MemoryRecord::new("u");
        r.apply_active(ActiveSignal::Shown(vec!["D1".into()]));
        r.apply_permanent(PreferenceUpdate::PriceCeiling(Some(300.0)));
        r.apply_active(ActiveSignal::Reset);
        assert!(r.active.last_shown.is_empty());
        assert_eq!(r.permanent.price_ceiling, Some(300.0));
    }

    #[test]
    fn like_raises_cuisine_and_tag_affinity() {
        let mut r = MemoryRecord::new("u");
        feedback_on(&mut r, noodles(), Feedback::like().with_rating(4.5));
        assert_eq!(r.permanent.cuisine_affinity["Chinese"], 1);
        assert_eq!(r.permanent.tag_affinity["Vegetarian"], 1);
        assert_eq!(r.permanent.tag_affinity["Quick"], 1);
        assert_eq!(r.permanent.order_history.len(), 1);
        assert_eq!(r.permanent.order_history[0].restaurant, "Wok Express");
        assert_eq!(r.permanent.recent_feedback[0].rating, Some(4.5));
        assert_eq!(r.permanent.preferred_cuisines(), ["Chinese"]);
    }

    #[test]
    fn dislike_lowers_affinity() {
        let mut r = MemoryRecord::new("u");
        feedback_on(&mut r, noodles(), Feedback::dislike());
        feedback_on(&mut r, noodles(), Feedback::dislike());
        assert_eq!(r.permanent.cuisine_affinity["Chinese"], -2);
        assert!(r.permanent.preferred_cuisines().is_empty());
        let disliked = r.permanent.disliked_tags();
        assert!(disliked.contains(&"Light".to_string()));
    }

    #[test]
    fn preferred_cuisines_strongest_first() {
        let mut p = PermanentMemory::default();
        p.cuisine_affinity.insert("Thai".into(), 1);
        p.cuisine_affinity.insert("Italian".into(), 3);
        p.cuisine_affinity.insert("Chinese".into(), -1);
        assert_eq!(p.preferred_cuisines(), ["Italian", "Thai"]);
    }

    #[test]
    fn eleventh_feedback_consolidates_oldest() {
        let mut r = MemoryRecord::new("u");
        for i in 0..=MAX_RECENT_FEEDBACK {
            let dish = Dish::new(format!("D{i}"), format!("Dish {i}"), "Indian", 100.0, 4.0);
            feedback_on(&mut r, dish, Feedback::like().with_rating(4.0).with_comment("good"));
        }
        let p = &r.permanent;
        assert_eq!(p.recent_feedback.len(), MAX_RECENT_FEEDBACK);
        assert_eq!(p.recent_feedback[0].dish_id, "D1");
        assert!(p.consolidated_feedback.starts_with("Older feedback summary:\n• Dish 0: good (rating 4/5) - "));
        assert_eq!(p.consolidated_feedback.lines().count(), 2);
        // Orders are never consolidated.
        assert_eq!(p.order_history.len(), MAX_RECENT_FEEDBACK + 1);
    }

    #[test]
    fn summary_lists_preferences_and_recent_orders() {
        let mut r = MemoryRecord::new("u");
        r.apply_permanent(PreferenceUpdate::Set {
            key: "dietary".into(),
            value: "Vegetarian".into(),
        });
        r.apply_permanent(PreferenceUpdate::PriceCeiling(Some(250.0)));
        for i in 0..7 {
            let dish = Dish::new(format!("D{i}"), format!("Dish {i}"), "Chinese", 100.0, 4.0)
                .with_restaurant("Wok");
            feedback_on(&mut r, dish, Feedback::like());
        }
        let s = r.summary();
        assert!(s.contains("User Preferences:\n  - dietary: Vegetarian"));
        assert!(s.contains("Price ceiling: 250"));
        assert!(s.contains("Favourite cuisines: Chinese"));
        assert!(s.contains("Order History (Total: 7 orders):"));
        assert!(!s.contains("Dish 1 from Wok"));
        assert!(s.contains("Dish 6 from Wok"));
        assert!(s.contains("  - Dish 0: like (like) - "));
    }

    #[test]
    fn record_deserialises_with_missing_sections() {
        let r: MemoryRecord = serde_json::from_str(r#"{"user_id":"bob"}"#).unwrap();
        assert_eq!(r.user_id, "bob");
        assert!(r.permanent.is_empty());
    }
}
