//! Ranked in-memory suggestion store.
//!
//! - **`suggestion`**: the `(text, weight)` value and its rank order.
//! - **`source`**: refresh documents and where they are loaded from.
//! - **`store`**: the concurrent, append-only ranked set and its substring query.

mod error;
pub mod source;
pub mod store;
pub mod suggestion;

pub use error::SourceError;
pub use source::{JsonFileSource, SourceRecord, SuggestionSource, DEFAULT_SOURCE_PATH};
pub use store::{RefreshReport, SuggestionStore, DEFAULT_LIMIT};
pub use suggestion::Suggestion;
