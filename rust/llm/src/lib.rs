//! LLM gateway and prompt catalog for the Stagewright engine.
//!
//! The gateway exposes a single provider-agnostic [`ChatClient::chat`]
//! operation; the production [`HttpChatClient`] normalizes messages to the
//! provider wire format and extracts assistant text from the response.
//! Tests inject fakes behind the same trait.

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod error;
pub mod message;
pub mod prompts;

pub use client::{ChatClient, ChatOptions, HttpChatClient, LlmConfig};
pub use error::{LlmError, LlmResult};
pub use message::{ChatMessage, Role};
pub use prompts::PromptCatalog;
