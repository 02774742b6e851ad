pub mod activity;
pub mod dashboard;
pub mod overdue;

pub use activity::AuditTrail;
pub use dashboard::{Dashboard, DashboardInput};
pub use overdue::{OverdueRun, OverdueUpdater};
