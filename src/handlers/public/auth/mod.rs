// handlers/public/auth/mod.rs - Public authentication handlers
//
// Token acquisition endpoints. Header mode returns both tokens in the body;
// cookie mode additionally keeps the refresh token in an httpOnly cookie.

pub mod cookie;
pub mod logout;
pub mod token;
pub mod utils;

pub use cookie::{cookie_login, cookie_refresh};
pub use logout::logout;
pub use token::{token_obtain, token_refresh, token_verify};
