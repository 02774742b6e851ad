// handlers/mod.rs - Two handler tiers
//
// Public (no auth): service info, health and token acquisition
// Protected (JWT auth): users, resources, reports

pub mod protected;
pub mod public;
