//! The agentic pipeline: plan, validate, execute, supervise.
//!
//! The planner produces a [`Plan`]; the plan supervisor validates it against
//! the request's tool and skill registries; the step executor dispatches each
//! step; the step supervisor classifies every non-completion observation into
//! a [`StepOutcome`]. [`AgentService`] owns the loop, the budgets, and the
//! event stream for one request.

mod executor;
mod plan;
mod plan_supervisor;
mod planner;
mod service;
mod step_supervisor;

pub use executor::{ConfirmationRequest, StepExecutor, StepObservation};
pub use plan::{parse_plan, Plan, PlanParseError, Step, StepKind, StepOutcome};
pub use plan_supervisor::{PlanSupervisor, PlanVerdict};
pub use planner::Planner;
pub use service::{AgentRequest, AgentService};
pub use step_supervisor::StepSupervisor;
