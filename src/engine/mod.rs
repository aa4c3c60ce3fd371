// ============================================================================
// Engine Module
// Matching core, order lifecycle, and the per-asset serialized worker
// ============================================================================

pub(crate) mod actor;
pub(crate) mod lifecycle;
pub mod matching;

pub use matching::{MatchOutcome, Matcher};
