//! Authentication tokens and session management

pub mod codec;
pub mod expiry;
pub mod models;
pub mod session;
pub mod state;
pub mod store;
pub mod sync;

pub use codec::decode;
pub use expiry::{is_expired, should_refresh, REFRESH_LEAD_SECS};
pub use models::{Claims, Credentials, TokenPair, User, UserRole};
pub use session::SessionManager;
pub use state::{AuthPhase, SessionState, Transition};
pub use store::{TokenScope, TokenStore};
pub use sync::{RemoteChange, SessionSync};
