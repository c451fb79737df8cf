//! REST API module for the clinic backend

pub mod chat;
pub mod client;
pub mod video;

pub use client::ApiClient;
