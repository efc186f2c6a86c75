//! screener-session - session and token lifecycle for the stock screener dashboard
//!
//! Decodes access tokens, decides when they need refreshing, stores token pairs
//! in a storage area shared by every open tab, and keeps those tabs on one
//! logical session. The [`auth::SessionManager`] is the entry point.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod devserver;
pub mod error;
pub mod storage;

pub use auth::SessionManager;
pub use config::Config;
pub use error::Error;
