//! Command-line front-end over a [`NoteStore`](crate::NoteStore).

mod app;
mod main;

pub use app::*;
pub use main::*;
