pub mod auth;
pub mod dashboard;
pub mod data;
pub mod server;
pub mod shell;
