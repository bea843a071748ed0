//! Vendor integrations behind one chat interface
//!
//! Each vendor implements [`ChatProvider`]; the relay only ever talks to them
//! through a [`ProviderAdapter`], which turns every failure into an
//! error-tagged reply instead of an `Err`.

pub mod adapter;
pub mod anthropic;
pub mod google;
pub mod openai;
pub mod openai_compat;
pub mod types;

pub use adapter::{DEFAULT_CALL_TIMEOUT, ProviderAdapter};
pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use types::{ChatProvider, ChatUsage};
