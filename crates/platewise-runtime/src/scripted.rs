//! [`ScriptedReasoner`] – deterministic [`Reasoner`] for tests and offline
//! demos.
//!
//! Replies are queued per operation and consumed in order.  Once a queue is
//! empty the reasoner answers neutrally: derivation searches the full
//! catalog, ranking keeps the first five candidates in the order given.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use platewise_types::{Dish, MAX_RECOMMENDATIONS, PlateError, RecommendationItem};
use tokio::sync::Mutex;

use crate::reasoner::{Derivation, Ranking, Reasoner};

#[derive(Debug)]
enum Step<T> {
    Reply(T),
    Fail(String),
}

impl<T> Step<T> {
    fn into_result(self) -> Result<T, PlateError> {
        match self {
            Step::Reply(v) => Ok(v),
            Step::Fail(msg) => Err(PlateError::ExternalService(msg)),
        }
    }
}

/// A [`Reasoner`] that plays back scripted results.
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    derive: Mutex<VecDeque<Step<Derivation>>>,
    rank: Mutex<VecDeque<Step<Ranking>>>,
    derive_delay: Option<Duration>,
    rank_delay: Option<Duration>,
    derive_calls: AtomicUsize,
    rank_calls: AtomicUsize,
    last_preferences: Mutex<Option<String>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a derivation result.
    pub fn then_derive(mut self, derivation: Derivation) -> Self {
        self.derive.get_mut().push_back(Step::Reply(derivation));
        self
    }

    /// Queue a derivation failure.
    pub fn then_derive_error(mut self, msg: impl Into<String>) -> Self {
        self.derive.get_mut().push_back(Step::Fail(msg.into()));
        self
    }

    /// Queue a ranking result.
    pub fn then_rank(mut self, ranking: Ranking) -> Self {
        self.rank.get_mut().push_back(Step::Reply(ranking));
        self
    }

    /// Queue a ranking failure.
    pub fn then_rank_error(mut self, msg: impl Into<String>) -> Self {
        self.rank.get_mut().push_back(Step::Fail(msg.into()));
        self
    }

    /// Sleep this long inside every derive call (to exercise timeouts).
    pub fn with_derive_delay(mut self, delay: Duration) -> Self {
        self.derive_delay = Some(delay);
        self
    }

    /// Sleep this long inside every rank call.
    pub fn with_rank_delay(mut self, delay: Duration) -> Self {
        self.rank_delay = Some(delay);
        self
    }

    pub fn derive_calls(&self) -> usize {
        self.derive_calls.load(Ordering::SeqCst)
    }

    pub fn rank_calls(&self) -> usize {
        self.rank_calls.load(Ordering::SeqCst)
    }

    /// Preference summary passed to the most recent call.
    pub async fn last_preferences(&self) -> Option<String> {
        self.last_preferences.lock().await.clone()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn derive_constraints(
        &self,
        _query: &str,
        preferences: &str,
    ) -> Result<Derivation, PlateError> {
        self.derive_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_preferences.lock().await = Some(preferences.to_string());
        if let Some(delay) = self.derive_delay {
            tokio::time::sleep(delay).await;
        }
        match self.derive.lock().await.pop_front() {
            Some(step) => step.into_result(),
            None => Ok(Derivation::full_catalog()),
        }
    }

    async fn rank(
        &self,
        candidates: &[Dish],
        _query: &str,
        preferences: &str,
    ) -> Result<Ranking, PlateError> {
        self.rank_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_preferences.lock().await = Some(preferences.to_string());
        if let Some(delay) = self.rank_delay {
            tokio::time::sleep(delay).await;
        }
        match self.rank.lock().await.pop_front() {
            Some(step) => step.into_result(),
            None => Ok(Ranking {
                picks: candidates
                    .iter()
                    .take(MAX_RECOMMENDATIONS)
                    .map(|d| RecommendationItem {
                        dish_id: d.id.clone(),
                        rationale: format!("{} matches your request.", d.name),
                    })
                    .collect(),
                summary: "Scripted picks.".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_back_queue_then_defaults() {
        let r = ScriptedReasoner::new()
            .then_derive_error("boom")
            .then_derive(Derivation::full_catalog());
        assert!(r.derive_constraints("q", "p").await.is_err());
        assert_eq!(r.derive_constraints("q", "p").await.unwrap(), Derivation::full_catalog());
        assert_eq!(r.derive_constraints("q", "p").await.unwrap(), Derivation::full_catalog());
        assert_eq!(r.derive_calls(), 3);
        assert_eq!(r.last_preferences().await.as_deref(), Some("p"));
    }

    #[tokio::test]
    async fn default_ranking_keeps_first_five_in_order() {
        let dishes: Vec<Dish> = (0..7)
            .map(|i| Dish::new(format!("D{i}"), format!("Dish {i}"), "Thai", 100.0, 4.0))
            .collect();
        let r = ScriptedReasoner::new();
        let ranking = r.rank(&dishes, "q", "p").await.unwrap();
        let ids: Vec<&str> = ranking.picks.iter().map(|p| p.dish_id.as_str()).collect();
        assert_eq!(ids, ["D0", "D1", "D2", "D3", "D4"]);
        assert_eq!(r.rank_calls(), 1);
    }
}
