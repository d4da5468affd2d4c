//! Workflow Automation Engine — multi-step, delay-based campaign
//! execution with stop-condition cancellation.
//!
//! Owns per-customer workflow instances, the durable time-ordered job
//! queue and the step executor that performs templated notification
//! dispatch.

pub mod engine;
pub mod types;
pub mod variables;

pub use engine::{
    seed_default_automations, ActivitySource, NoActivity, RetryPolicy, StepOutcome,
    TriggerOutcome, WorkflowEngine,
};
pub use types::{
    EntryCondition, ScheduledJob, StepAction, StepCondition, StopCondition, WorkflowDefinition,
    WorkflowInstance, WorkflowState, WorkflowStep,
};
pub use variables::TemplateVariable;
