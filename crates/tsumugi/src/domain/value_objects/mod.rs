//! Value Objects
//!
//! Immutable objects defined by their attributes rather than identity.

mod chat_event;
mod provider;
mod usage_type;

pub use chat_event::*;
pub use provider::*;
pub use usage_type::*;
