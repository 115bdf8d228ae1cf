//! Coedit Protocol - realtime wire events
//!
//! JSON events exchanged over the realtime transport, plus the typed room
//! keys the hub fans out on. Event names use the `category:action` form;
//! payload fields are camelCase on the wire.

pub mod error;
pub mod event;
pub mod room;

pub use error::ProtocolError;
pub use event::{ClientEvent, ServerEvent, ACCESS_DENIED_MESSAGE};
pub use room::RoomKey;
