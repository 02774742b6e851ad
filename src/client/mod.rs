//! Authenticated client for the Camaleão API.
//!
//! [`ApiClient`] sends JSON requests with the access token and refreshes it
//! through a single-flight [`RefreshCoordinator`]; [`InactivityMonitor`]
//! forces logout after 15 idle minutes; [`Session`] tracks who is signed in.

pub mod claims;
pub mod error;
pub mod events;
pub mod http;
pub mod inactivity;
pub mod refresh;
pub mod session;
pub mod tokens;

pub use error::{ClientError, RefreshError};
pub use events::{ReauthReason, SessionEvent, SessionEvents};
pub use http::{ApiClient, AuthMode};
pub use inactivity::{ActivityKind, ActivityOutcome, InactivityMonitor, MonitorSettings, TickOutcome};
pub use refresh::RefreshCoordinator;
pub use session::{CurrentUser, Session};
pub use tokens::{FileTokenStore, MemoryTokenStore, TokenStore};
