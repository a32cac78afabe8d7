//! `platewise-web` – browser front end for the recommender.
//!
//! Boots a small HTTP + WebSocket server (default port `8080`) that:
//!
//! 1. **Serves** the embedded single-page UI at every non-WebSocket path.
//!
//! 2. **Answers** JSON requests over a WebSocket, one reply per request:
//!    - `"/recommend"` → up to five dishes with rationale, the applied
//!      constraints and any fallbacks taken.
//!    - `"/feedback"` → a like or dislike for a dish that was just shown.
//!    - `"/profile"` → the stored memory record and its text summary.
//!    - `"/catalog"` → catalog statistics and every dish.
//!
//! # Usage
//!
//! ```rust,no_run
//! use platewise_runtime::{Settings, build_orchestrator, llm_reasoner};
//! use platewise_web::WebServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), platewise_types::PlateError> {
//!     let settings = Settings::new("dishes.csv", "memory");
//!     let orchestrator = build_orchestrator(&settings, Box::new(llm_reasoner(&settings)))?;
//!     WebServer::new(orchestrator).run().await
//! }
//! ```

pub mod server;

pub use server::{BoundServer, DEFAULT_PORT, DEFAULT_USER, Reply, SharedOrchestrator, WebServer, dispatch};
