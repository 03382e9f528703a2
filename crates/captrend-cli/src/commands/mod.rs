pub mod audit;
pub mod plan;
pub mod stats;

pub use audit::AuditCommand;
pub use plan::PlanCommand;
pub use stats::StatsCommand;
