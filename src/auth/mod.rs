//! Authentication: password login and the stored session
//!
//! The backend hands out a bearer token together with the user record; both
//! are persisted through `SessionStore` and read back by every command.

pub mod login;
pub mod tokens;

pub use login::{login, logout, status};
pub use tokens::{SessionStore, StoredSession, StoredToken};
