//! Development stand-in for the Auth API
//!
//! Implements `/auth/login`, `/auth/refresh`, `/auth/logout` and `/auth/me`
//! with configured accounts, so the session client can be driven end to end
//! without the real backend.

pub mod jwt;
pub mod routes;
pub mod server;
pub mod users;

pub use jwt::{IssuedClaims, TokenIssuer, TokenKind};
pub use server::{create_router, run_server, serve, spawn_local, AppState};
pub use users::UserDirectory;
