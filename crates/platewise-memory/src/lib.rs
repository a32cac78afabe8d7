//! `platewise-memory` – what the recommender remembers about each user.
//!
//! # Modules
//!
//! - [`record`] – [`MemoryRecord`][record::MemoryRecord]: session-scoped
//!   *active* memory (last query, last shown dishes) next to durable
//!   *permanent* memory (stated preferences, cuisine/tag affinity, order
//!   history, a rolling window of detailed feedback with older entries
//!   consolidated into a text summary).
//! - [`store`] – [`MemoryStore`][store::MemoryStore]: one JSON file per user,
//!   written atomically, degrading to session-only memory when the disk is
//!   unavailable.
//! - [`sample`] – the demo user used by first-run walkthroughs.

pub mod record;
pub mod sample;
pub mod store;

pub use record::{
    ActiveMemory, ActiveSignal, FeedbackEntry, MemoryRecord, OrderEntry, PermanentMemory,
    PreferenceUpdate, MAX_RECENT_FEEDBACK,
};
pub use sample::{sample_record, seed_sample_user, SAMPLE_USER_ID};
pub use store::{encode_user_id, MemoryStore, SaveStatus};
