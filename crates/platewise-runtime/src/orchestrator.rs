//! [`Orchestrator`] – one query in, one [`Recommendation`] out.
//!
//! ```text
//!  query ─► load memory ─► derive constraints ─► filter catalog ─► rank ─► remember what was shown
//!                          (timeout → full        (bad constraint   (timeout → top
//!                           catalog)               → dropped)         rated)
//! ```
//!
//! Every step after catalog load degrades instead of failing: the caller
//! always gets a [`Recommendation`], with [`Fallback`] entries naming the
//! steps that ran in a reduced mode.
//!
//! Sessions are keyed by the caller's user id.  At most
//! [`DEFAULT_SESSION_CAPACITY`] are kept; the least recently used one is
//! evicted, and whatever it had not saved (active memory at least) is lost.  A user whose stored record could
//! not be read is never saved for the rest of the session, so the damaged
//! file stays as it was.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use platewise_catalog::{Catalog, filter};
use platewise_memory::{
    ActiveSignal, MemoryRecord, MemoryStore, PreferenceUpdate, SAMPLE_USER_ID, SaveStatus,
    seed_sample_user,
};
use platewise_types::{
    Dish, Fallback, Feedback, MAX_RECOMMENDATIONS, PlateError, Recommendation, RecommendationItem,
};
use tracing::{debug, info, warn};

use crate::reasoner::{Derivation, Ranking, Reasoner};

/// Default bound on each reasoning call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(20);

/// Default bound on live sessions.
pub const DEFAULT_SESSION_CAPACITY: usize = 1024;

const PADDING_RATIONALE: &str = "Another good match for your request.";

/// A user's live record.
struct Session {
    record: MemoryRecord,
    /// `false` when the stored record was unreadable.
    persist: bool,
    last_used: u64,
}

/// Drives the query → recommendation flow and applies feedback.
pub struct Orchestrator {
    catalog: Catalog,
    store: MemoryStore,
    reasoner: Box<dyn Reasoner>,
    /// Records of users seen by this process, by caller user id.
    sessions: HashMap<String, Session>,
    session_capacity: usize,
    clock: u64,
    call_timeout: Duration,
}

impl Orchestrator {
    pub fn new(catalog: Catalog, store: MemoryStore, reasoner: Box<dyn Reasoner>) -> Self {
        Self {
            catalog,
            store,
            reasoner,
            sessions: HashMap::new(),
            session_capacity: DEFAULT_SESSION_CAPACITY,
            clock: 0,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Keep at most `capacity` sessions (minimum one).
    pub fn with_session_capacity(mut self, capacity: usize) -> Self {
        self.session_capacity = capacity.max(1);
        self
    }

    /// Bound every reasoning call by `timeout`.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    // ── Sessions ─────────────────────────────────────────────────────────────

    /// Take `user_id`'s session out of the map, loading it on first use.
    /// Active memory from a previous process is discarded.
    fn checkout(&mut self, user_id: &str, fallbacks: &mut Vec<Fallback>) -> Session {
        if let Some(session) = self.sessions.remove(user_id) {
            return session;
        }
        match self.store.load(user_id) {
            Ok(mut record) => {
                record.apply_active(ActiveSignal::Reset);
                Session {
                    record,
                    persist: true,
                    last_used: 0,
                }
            }
            Err(e) => {
                warn!(user_id, error = %e, "memory unavailable, starting fresh");
                fallbacks.push(Fallback::MemoryUnavailable(e.to_string()));
                Session {
                    record: MemoryRecord::new(user_id),
                    persist: false,
                    last_used: 0,
                }
            }
        }
    }

    /// Put a session back without saving it.
    fn park(&mut self, user_id: &str, mut session: Session) {
        self.clock += 1;
        session.last_used = self.clock;
        self.sessions.insert(user_id.to_string(), session);
        while self.sessions.len() > self.session_capacity {
            let Some(oldest) = self
                .sessions
                .iter()
                .filter(|(id, _)| id.as_str() != user_id)
                .min_by_key(|(_, s)| s.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!(user_id = %oldest, "evicting idle session");
            self.sessions.remove(&oldest);
        }
    }

    /// Save the session (unless its stored record was unreadable) and put it
    /// back.
    fn checkin(
        &mut self,
        user_id: &str,
        session: Session,
        fallbacks: &mut Vec<Fallback>,
    ) -> SaveStatus {
        let status = if session.persist {
            self.store.save(&session.record)
        } else {
            SaveStatus::Skipped {
                reason: format!("stored memory for `{user_id}` is unreadable; leaving it untouched"),
            }
        };
        if let SaveStatus::Skipped { reason } = &status {
            fallbacks.push(Fallback::MemoryNotPersisted(reason.clone()));
        }
        self.park(user_id, session);
        status
    }

    /// Current record for `user_id` (loaded on first use).
    pub fn profile(&mut self, user_id: &str) -> MemoryRecord {
        let mut ignored = Vec::new();
        let session = self.checkout(user_id, &mut ignored);
        let record = session.record.clone();
        self.park(user_id, session);
        record
    }

    /// Store the demo user's history and make it the live session record for
    /// that user.
    pub fn seed_demo(&mut self) -> (MemoryRecord, SaveStatus) {
        let (record, status) = seed_sample_user(&mut self.store);
        let session = Session {
            record: record.clone(),
            persist: true,
            last_used: 0,
        };
        self.park(SAMPLE_USER_ID, session);
        (record, status)
    }

    // ── Recommend ────────────────────────────────────────────────────────────

    /// Recommend up to five dishes for `query`.
    pub async fn recommend(&mut self, user_id: &str, query: &str) -> Recommendation {
        let mut fallbacks = Vec::new();
        let mut session = self.checkout(user_id, &mut fallbacks);
        let preferences = session.record.summary();

        // 1. Constraints.
        let derivation = match tokio::time::timeout(
            self.call_timeout,
            self.reasoner.derive_constraints(query, &preferences),
        )
        .await
        {
            Ok(Ok(d)) => d,
            Ok(Err(e)) => {
                warn!(user_id, error = %e, "constraint derivation failed, using full catalog");
                fallbacks.push(Fallback::ConstraintsUnavailable(e.to_string()));
                Derivation::full_catalog()
            }
            Err(_) => {
                warn!(user_id, timeout = ?self.call_timeout, "constraint derivation timed out");
                fallbacks.push(Fallback::ConstraintsUnavailable(format!(
                    "timed out after {:?}",
                    self.call_timeout
                )));
                Derivation::full_catalog()
            }
        };
        for raw in &derivation.skipped {
            fallbacks.push(Fallback::ConstraintDropped(format!("unparseable constraint {raw}")));
        }
        let requested = if derivation.search_catalog {
            derivation.constraints
        } else {
            debug!(user_id, "query does not need catalog narrowing");
            Vec::new()
        };

        // 2. Filter.
        let (constraints, rejected) = filter::partition_valid(requested);
        for (constraint, e) in rejected {
            warn!(field = %constraint.field, error = %e, "dropping invalid constraint");
            fallbacks.push(Fallback::ConstraintDropped(e.to_string()));
        }
        let candidates = filter::apply(self.catalog.all(), &constraints).unwrap_or_else(|e| {
            warn!(error = %e, "filter rejected validated constraints, using full catalog");
            self.catalog.all().to_vec()
        });

        // 3. Rank.
        let (items, rationale) = if candidates.is_empty() {
            (
                Vec::new(),
                "No dishes match those requirements. Try relaxing the price, cuisine or \
                 dietary filters."
                    .to_string(),
            )
        } else {
            self.rank(&candidates, query, &preferences, &mut fallbacks).await
        };

        // 4. Remember.
        let shown: Vec<String> = items.iter().map(|i| i.dish_id.clone()).collect();
        session.record.apply_active(ActiveSignal::Query(query.to_string()));
        session.record.apply_active(ActiveSignal::Shown(shown));
        self.checkin(user_id, session, &mut fallbacks);

        info!(
            user_id,
            candidates = candidates.len(),
            picks = items.len(),
            degraded = fallbacks.len(),
            "recommendation ready"
        );
        Recommendation {
            items,
            rationale,
            constraints,
            fallbacks,
        }
    }

    async fn rank(
        &self,
        candidates: &[Dish],
        query: &str,
        preferences: &str,
        fallbacks: &mut Vec<Fallback>,
    ) -> (Vec<RecommendationItem>, String) {
        let outcome = tokio::time::timeout(
            self.call_timeout,
            self.reasoner.rank(candidates, query, preferences),
        )
        .await;
        let reason = match outcome {
            Ok(Ok(ranking)) => match reconcile(ranking, candidates) {
                Some(ranked) => return ranked,
                None => "ranking named none of the candidates".to_string(),
            },
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.call_timeout),
        };
        warn!(reason = %reason, "ranking unavailable, ordering by rating");
        fallbacks.push(Fallback::RankingUnavailable(reason));
        (
            top_rated(candidates, MAX_RECOMMENDATIONS),
            "Showing the highest-rated matches.".to_string(),
        )
    }

    // ── Feedback ─────────────────────────────────────────────────────────────

    /// Apply `feedback` on `dish_id` to `user_id`'s permanent memory and
    /// persist it.
    ///
    /// # Errors
    ///
    /// [`PlateError::UnknownFeedbackTarget`] when `dish_id` was not part of
    /// the user's last recommendation; nothing is changed in that case.
    pub fn record_feedback(
        &mut self,
        user_id: &str,
        dish_id: &str,
        feedback: Feedback,
    ) -> Result<SaveStatus, PlateError> {
        let mut ignored = Vec::new();
        let mut session = self.checkout(user_id, &mut ignored);
        let dish = match self.catalog.get(dish_id) {
            Some(dish) if session.record.was_shown(dish_id) => dish.clone(),
            _ => {
                self.park(user_id, session);
                return Err(PlateError::UnknownFeedbackTarget(dish_id.to_string()));
            }
        };
        let signal = feedback.signal;
        session
            .record
            .apply_permanent(PreferenceUpdate::Feedback { dish, feedback });
        let status = self.checkin(user_id, session, &mut ignored);
        info!(user_id, dish_id, %signal, persisted = status.is_saved(), "feedback recorded");
        Ok(status)
    }
}

/// Clean up a model ranking against the real candidate list: unknown and
/// repeated ids are dropped, at most five picks are kept, and a short list
/// is topped up from the remaining candidates in filter order.  `None` when
/// no pick survives.
fn reconcile(ranking: Ranking, candidates: &[Dish]) -> Option<(Vec<RecommendationItem>, String)> {
    let known: HashSet<&str> = candidates.iter().map(|d| d.id.as_str()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut items: Vec<RecommendationItem> = ranking
        .picks
        .into_iter()
        .filter(|p| known.contains(p.dish_id.as_str()) && seen.insert(p.dish_id.clone()))
        .take(MAX_RECOMMENDATIONS)
        .collect();
    if items.is_empty() {
        return None;
    }
    let target = MAX_RECOMMENDATIONS.min(candidates.len());
    for dish in candidates {
        if items.len() >= target {
            break;
        }
        if seen.insert(dish.id.clone()) {
            items.push(RecommendationItem {
                dish_id: dish.id.clone(),
                rationale: PADDING_RATIONALE.to_string(),
            });
        }
    }
    let summary = if ranking.summary.trim().is_empty() {
        "Here are the dishes that best match your request.".to_string()
    } else {
        ranking.summary
    };
    Some((items, summary))
}

/// The `n` best-rated candidates; equal ratings keep filter order.
fn top_rated(candidates: &[Dish], n: usize) -> Vec<RecommendationItem> {
    let mut sorted: Vec<&Dish> = candidates.iter().collect();
    sorted.sort_by(|a, b| b.rating.total_cmp(&a.rating));
    sorted
        .into_iter()
        .take(n)
        .map(|d| RecommendationItem {
            dish_id: d.id.clone(),
            rationale: format!("{} is rated {:.1}/5.", d.name, d.rating),
        })
        .collect()
}
