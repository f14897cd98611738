//! ScriptPipeline (C8): turns a structured product brief into a ranked
//! recommendation and drives its confirm/ship/order continuation.

pub mod comparator;
pub mod pipeline;
pub mod tts;

pub use comparator::{rank, RankResult, ScoredProduct};
pub use pipeline::{ContinueResult, ScriptPipeline, ScriptResult};
pub use tts::{HttpTtsSynthesizer, NullTtsSynthesizer, TtsSynthesizer};
