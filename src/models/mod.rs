//! Data models for conversations, identities and call signaling payloads

mod call;
mod message;
mod user;

pub use call::*;
pub use message::*;
pub use user::*;

pub(crate) use message::id_ref;
