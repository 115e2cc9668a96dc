//! Reasoning backend integration
//!
//! This module provides the chat transcript types, the two diagnosis tool
//! schemas and a client for OpenAI-compatible `/chat/completions` endpoints
//! (the hosted model, or a local Ollama server).

pub mod client;
pub mod tool_use;
pub mod usage;

// Re-export public types so other modules can `use crate::llm::ChatMessage`
pub use client::{
    AssistantTurn, BackendError, BackendKind, BackendSet, BackendSettings, ChatCompletionsClient,
    ReasoningBackend,
};
pub use tool_use::{
    diagnosis_tools, ChatMessage, FunctionCall, Tool, ToolCall, ToolFunction, ToolInvocation,
    DEFAULT_DIAGNOSIS_SYSTEM_PROMPT,
};
pub use usage::TokenUsage;
