//! ABOUTME: LLM Gateway (C7): provider facade, invocation retry, and robust JSON repair parsing

pub mod json_repair;
pub mod provider;

pub use json_repair::parse_llm_json;
pub use provider::{llm_retry_config, HttpLlmProvider, LlmProvider};
