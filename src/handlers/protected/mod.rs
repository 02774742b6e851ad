// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every route here sits behind `jwt_auth_middleware`, which puts the
// authenticated `AuthUser` into the request extensions. Role checks live in
// `middleware::permissions` and are applied per handler.

pub mod activity;
pub mod dashboard;
pub mod plans;
pub mod records;
pub mod users;
