//! Model lifecycle: declaration, live record, registry, admission planner,
//! and the manager that ties them to the backend supervisor and GPU oracle.

pub mod declaration;
pub mod manager;
pub mod planner;
pub mod record;
pub mod registry;

pub use declaration::ModelDeclaration;
pub use manager::{ManagerError, ModelManager};
pub use planner::{AdmissionPlanner, PlannerError, Shortfall};
pub use record::{LiveRef, ModelRecord, ModelState};
pub use registry::{ModelApiEntry, ModelDetailEntry, ModelMetricsEntry, ModelRegistry};
