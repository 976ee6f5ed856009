//! Context Manager, token counters, secret redaction, and the compaction
//! engine (§4.2, §4.7, §4.8).

pub mod compact;
pub mod manager;
pub mod redact;
pub mod tokens;

pub use compact::{compact, should_compact, CompactionConfig, CompactionError, CompactionResult};
pub use manager::{ContextManager, TokenUsage, TruncationStrategy};
pub use redact::{redact, redact_value};
pub use tokens::{BpeTokenCounter, FallbackTokenCounter, TokenCounter};
