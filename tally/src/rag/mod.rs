//! Retrieval-augmented context for command parsing and execution.
//!
//! Each command sees the recent turns of its own session plus semantically
//! related turns from anywhere in the user's history, re-ranked by
//! [`HybridScorer`]. Anaphors such as "it" are resolved against those turns.

mod hybrid;
mod references;
mod retry;
mod service;
mod session;

pub use hybrid::{keyword_overlap, keywords, HybridScorer};
pub use references::{find_anaphor, resolve_reference, ANAPHORS};
pub use retry::retry_transient;
pub use service::RagContextService;
pub use session::{SessionContext, SessionLane, SessionLanes};
