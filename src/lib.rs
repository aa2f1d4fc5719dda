//! Notes storage library
//!
//! This library stores titled text notes with tags, pinning, search and a bounded
//! version history, behind one [`NoteStore`] contract with two backends: a JSON
//! document on disk ([`FileStore`]) and PostgreSQL ([`PgStore`]).

mod cli;
mod config;
mod document;
mod errors;
mod flush_scheduler;
mod helper;
mod note;
mod pg_store;
mod storage;
mod store;
mod types;
mod versions;
pub mod validation;

// Re-export key components
pub use cli::*;
pub use config::*;
pub use document::*;
pub use errors::*;
pub use flush_scheduler::*;
pub use helper::*;
pub use note::*;
pub use pg_store::*;
pub use storage::*;
pub use store::*;
pub use types::*;
pub use validation::*;
pub use versions::*;
