//! `pal-memory` – associative recall for PAL.
//!
//! Turns what PAL currently sees and feels into a search query, looks up
//! related memories, and condenses the hits into a short visual phrase for
//! the narration layer.
//!
//! # Modules
//!
//! - [`gateway`] – [`ToolGateway`][gateway::ToolGateway]: HTTP client for the
//!   `/tools/invoke` endpoint shared by memory search and speech synthesis.
//! - [`search`] – the [`MemorySearch`][search::MemorySearch] trait and its
//!   remote implementation [`GatewaySearch`][search::GatewaySearch].
//! - [`fallback`] – [`LocalMemoryFiles`][fallback::LocalMemoryFiles]:
//!   keyword scoring over the Markdown memory workspace, used when the remote
//!   search is unavailable.
//! - [`cache`] – [`RecallCache`][cache::RecallCache]: 30 s TTL cache bounded
//!   at 50 entries with oldest-insertion eviction.
//! - [`recall`] – [`MemoryRecall`][recall::MemoryRecall]: query building,
//!   the cache → remote → fallback chain, and the visual summary.

pub mod cache;
pub mod fallback;
pub mod gateway;
pub mod recall;
pub mod search;

pub use cache::RecallCache;
pub use fallback::LocalMemoryFiles;
pub use gateway::{GatewayError, ToolGateway};
pub use recall::{MemoryRecall, RecallOrigin, RecallOutcome};
pub use search::{GatewaySearch, MemoryError, MemorySearch};
