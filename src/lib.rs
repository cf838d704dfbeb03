//! Inbox Agent — LLM-assisted email triage over a local mock inbox.
//!
//! Raw emails are immutable; categories, action items, summaries and drafts
//! live in a separate annotation file and are joined on every load.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod inbox;
pub mod llm;
pub mod pipeline;
pub mod store;
