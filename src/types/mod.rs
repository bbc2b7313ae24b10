//! Core types for the relay.

pub mod envelope;
pub mod event;
pub mod message;
pub mod turn;

pub use envelope::*;
pub use event::*;
pub use message::*;
pub use turn::*;
