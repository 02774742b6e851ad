pub mod auth;
pub mod permissions;
pub mod response;

pub use auth::{jwt_auth_middleware, AuthUser, RequestMeta};
pub use response::{ApiResponse, ApiResult};
