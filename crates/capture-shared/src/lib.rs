//! # capture-shared
//!
//! Data model shared by every crate of the capture workspace: the queued
//! [`LocalImage`](types::LocalImage) record, the fixed set of document field
//! kinds, and the in-memory document view the UI renders.

pub mod constants;
pub mod document;
pub mod error;
pub mod types;

pub use document::{Document, DocumentContent, DocumentStats, FieldEntry};
pub use error::SharedError;
pub use types::{FieldKey, FieldType, ImageCategory, LocalImage, SyncStatus};
