//! Note data model and the in-memory note store.
//!
//! A note is anchored to a point in document space on one page of one file.
//! [`NoteStore`] is the authoritative in-memory copy of every note and keeps a
//! [`NoteGateway`] in sync with it.

pub mod gateway;
pub mod note;
pub mod store;

pub use gateway::{GatewayError, MemoryGateway, NoteGateway};
pub use note::{DocCoord, DocPoint, Note, NoteKey, NoteRow};
pub use store::{NoteStore, StoreError};
