//! Language-model backed intent classification and conversational fallback

mod classifier;
mod client;
mod responder;
mod traits;

pub use classifier::LlmClassifier;
pub use client::LlmClient;
pub use responder::LlmResponder;
pub use traits::{Conversationalist, IntentClassifier};
