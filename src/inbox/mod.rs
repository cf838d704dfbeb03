//! Inbox view: raw email records merged with their stored annotations.

pub mod loader;
pub mod model;

pub use loader::InboxLoader;
pub use model::{
    ActionItem, AnnotationRecord, Email, NumericId, PromptConfig, RawEmail, is_actionable,
};
