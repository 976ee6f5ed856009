//! Token Counter (§4.2): two implementations of a common contract, so either
//! can be plugged into [`crate::manager::ContextManager`].

use nexus3_core::Message;

/// Fixed per-message overhead (role marker, separators) added to every
/// counted message regardless of which counter is in use.
const MESSAGE_OVERHEAD: u64 = 4;

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u64;

    fn count_message(&self, message: &Message) -> u64 {
        let mut total = MESSAGE_OVERHEAD + self.count(&message.content);
        if let Some(calls) = &message.tool_calls {
            for call in calls {
                let serialized = serde_json::to_string(&call.arguments).unwrap_or_default();
                total += self.count(&serialized);
            }
        }
        total
    }

    fn count_messages(&self, messages: &[Message]) -> u64 {
        messages.iter().map(|m| self.count_message(m)).sum()
    }
}

/// Wraps `tiktoken-rs`'s `cl100k_base` BPE encoding.
pub struct BpeTokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl BpeTokenCounter {
    pub fn new() -> Result<Self, anyhow::Error> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count(&self, text: &str) -> u64 {
        self.bpe.encode_ordinary(text).len() as u64
    }
}

/// `ceil(len(text)/4)` char-based estimator, used when the BPE tables aren't
/// available or precision isn't worth the cost.
#[derive(Clone, Copy, Default)]
pub struct FallbackTokenCounter;

impl TokenCounter for FallbackTokenCounter {
    fn count(&self, text: &str) -> u64 {
        let len = text.chars().count() as u64;
        len.div_ceil(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus3_core::Message;

    #[test]
    fn fallback_counts_ceil_div_four() {
        let c = FallbackTokenCounter;
        assert_eq!(c.count("abcd"), 1);
        assert_eq!(c.count("abcde"), 2);
        assert_eq!(c.count(""), 0);
    }

    #[test]
    fn message_overhead_is_fixed() {
        let c = FallbackTokenCounter;
        let m = Message::user("");
        assert_eq!(c.count_message(&m), MESSAGE_OVERHEAD);
    }

    #[test]
    fn bpe_counter_constructs() {
        let c = BpeTokenCounter::new().expect("cl100k_base should load");
        assert!(c.count("hello world") > 0);
    }
}
