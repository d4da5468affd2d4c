use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pulse_core::types::MessageChannel;

use crate::variables::TemplateVariable;

/// Static configuration for one automation: what triggers it, who may
/// enter, the ordered step sequence and the predicates that abort it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub automation_id: String,
    /// Event label that conventionally starts this automation, e.g.
    /// "cart_abandoned". Informational; triggering is programmatic.
    pub trigger_event: String,
    pub entry_conditions: Vec<EntryCondition>,
    pub steps: Vec<WorkflowStep>,
    pub stop_conditions: Vec<StopCondition>,
}

/// Gate evaluated once at trigger time. Failing any condition silently
/// declines entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EntryCondition {
    /// Context `cart_value` must be at least this much.
    MinCartValue { amount: f64 },
    /// The customer directory must hold an email address.
    HasEmail,
    /// Lifetime spend must reach the VIP tier.
    VipTier { min_spend: f64 },
}

/// One step of an automation sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Wait before this step's action runs. Zero executes synchronously.
    pub delay_ms: u64,
    /// Optional per-step gate; when false the step is skipped without
    /// executing its action.
    pub condition: Option<StepCondition>,
    pub action: StepAction,
}

/// Per-step gate evaluated right before the action would run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StepCondition {
    /// The customer has not placed an order within the last N hours.
    NoRecentPurchase { hours: i64 },
    /// The customer is still opted in to messaging.
    StillSubscribed,
}

/// Templated outbound message dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepAction {
    pub channel: MessageChannel,
    pub subject: Option<String>,
    /// Body template with `{{variable}}` placeholders.
    pub template: String,
    /// Allow-listed variables resolved for this step.
    pub variables: Vec<TemplateVariable>,
}

/// Predicate that aborts a live instance. Checked immediately before any
/// due job executes; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StopCondition {
    OrderPlacedSinceStart,
    CartModifiedSinceStart,
    Unsubscribed,
    NewSessionWithin { hours: i64 },
}

impl StopCondition {
    pub fn label(&self) -> &'static str {
        match self {
            StopCondition::OrderPlacedSinceStart => "order_placed_since_start",
            StopCondition::CartModifiedSinceStart => "cart_modified_since_start",
            StopCondition::Unsubscribed => "unsubscribed",
            StopCondition::NewSessionWithin { .. } => "new_session_started",
        }
    }
}

/// Lifecycle state of a workflow instance. Terminal states delete the
/// instance from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Scheduled, waiting for a delay to elapse.
    Pending,
    /// A step action is being run.
    Executing,
    /// Moving on to the next step in the sequence.
    Advancing,
    Stopped,
    Completed,
}

impl WorkflowState {
    /// Whether `self -> to` is a legal lifecycle transition.
    pub fn can_transition(self, to: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, to),
            (Pending, Executing)
                | (Pending, Stopped)
                | (Pending, Completed)
                | (Executing, Advancing)
                | (Executing, Stopped)
                | (Executing, Completed)
                | (Advancing, Executing)
                | (Advancing, Pending)
                | (Advancing, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Stopped | WorkflowState::Completed)
    }
}

/// One customer's live progress through an automation. At most one live
/// instance exists per (automation, customer) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub automation_id: String,
    pub customer_id: String,
    pub started_at: DateTime<Utc>,
    pub current_step_index: usize,
    pub state: WorkflowState,
    pub context: HashMap<String, serde_json::Value>,
}

impl WorkflowInstance {
    pub fn new(
        automation_id: &str,
        customer_id: &str,
        context: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            automation_id: automation_id.to_string(),
            customer_id: customer_id.to_string(),
            started_at: now,
            current_step_index: 0,
            state: WorkflowState::Pending,
            context,
        }
    }

    /// Store key guaranteeing the one-live-instance invariant per
    /// (automation, customer) pair.
    pub fn key(&self) -> String {
        instance_key(&self.automation_id, &self.customer_id)
    }

    /// Moves to `to`, rejecting transitions outside the lifecycle graph.
    pub fn transition(&mut self, to: WorkflowState) -> anyhow::Result<()> {
        if self.state.can_transition(to) {
            self.state = to;
            Ok(())
        } else {
            anyhow::bail!(
                "invalid workflow state transition {:?} -> {:?}",
                self.state,
                to
            )
        }
    }
}

pub fn instance_key(automation_id: &str, customer_id: &str) -> String {
    format!("{}:{}", automation_id, customer_id)
}

/// A serialized wait: the instance plus the instant its next step is due.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub execute_at: DateTime<Utc>,
    pub automation_id: String,
    pub instance: WorkflowInstance,
}
