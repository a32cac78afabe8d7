//! `platewise-runtime` – the recommendation engine.
//!
//! Ties the catalog and memory crates to the external reasoning service.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]:
//!   loads the user's memory, derives catalog constraints, filters, ranks
//!   up to five dishes and remembers what was shown; applies like/dislike
//!   feedback to permanent memory.  Each reasoning call is bounded by a
//!   timeout and falls back (full catalog, then rating order) on failure.
//! - [`reasoner`] – the [`Reasoner`][reasoner::Reasoner] trait and
//!   [`LlmReasoner`][reasoner::LlmReasoner], which asks a chat model for
//!   structured JSON and tolerates fenced or chatty replies.
//! - [`scripted`] – [`ScriptedReasoner`][scripted::ScriptedReasoner]: a
//!   deterministic reasoner for tests and offline demos.
//! - [`llm_driver`] – [`LlmDriver`][llm_driver::LlmDriver]: an
//!   OpenAI-compatible `/v1/chat/completions` client.
//!   [`RESPONSE_GUIDELINES`][llm_driver::RESPONSE_GUIDELINES] are appended to
//!   every system message and a `schemars`-generated JSON Schema is sent as
//!   `response_format`.
//! - [`bootstrap`] – [`initialize`][bootstrap::initialize]: explicit,
//!   once-only startup with the resolved [`Settings`][bootstrap::Settings].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional OTLP span export.

pub mod bootstrap;
pub mod llm_driver;
pub mod orchestrator;
pub mod reasoner;
pub mod scripted;
pub mod telemetry;

pub use bootstrap::{Settings, build_orchestrator, initialize, llm_reasoner};
pub use llm_driver::{ChatMessage, LlmDriver, LlmError, RESPONSE_GUIDELINES, Role};
pub use orchestrator::{DEFAULT_CALL_TIMEOUT, DEFAULT_SESSION_CAPACITY, Orchestrator};
pub use reasoner::{Derivation, LlmReasoner, Ranking, Reasoner};
pub use scripted::ScriptedReasoner;
pub use telemetry::{TracerProviderGuard, init_tracing};
