//! Workflow instance lifecycle: triggering, step execution, stop-condition
//! cancellation and the durable job queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use pulse_core::collaborators::{CustomerDirectory, NotificationDispatcher, OrderHistory};
use pulse_core::store::{TimeQueue, TtlMap};
use pulse_core::types::{EventName, MessageChannel, RenderedMessage};
use pulse_tracking::EventTracker;

use crate::types::{
    instance_key, EntryCondition, ScheduledJob, StepCondition, StopCondition, WorkflowDefinition,
    WorkflowInstance, WorkflowState, WorkflowStep,
};
use crate::variables::{render, resolve_variables};

/// Recent-activity reads the stop conditions need. The event tracker is
/// the production source; tests substitute fixtures.
pub trait ActivitySource: Send + Sync {
    fn last_cart_activity(&self, customer_id: &str) -> Option<DateTime<Utc>>;
    fn last_session_start(&self, customer_id: &str) -> Option<DateTime<Utc>>;
}

/// Source for deployments without live tracking attached.
pub struct NoActivity;

impl ActivitySource for NoActivity {
    fn last_cart_activity(&self, _customer_id: &str) -> Option<DateTime<Utc>> {
        None
    }
    fn last_session_start(&self, _customer_id: &str) -> Option<DateTime<Utc>> {
        None
    }
}

impl ActivitySource for EventTracker {
    fn last_cart_activity(&self, customer_id: &str) -> Option<DateTime<Utc>> {
        self.recent_events(usize::MAX)
            .iter()
            .filter(|e| {
                matches!(e.name, EventName::AddToCart | EventName::RemoveFromCart)
                    && e.customer_id.as_deref() == Some(customer_id)
            })
            .map(|e| e.timestamp)
            .max()
    }

    fn last_session_start(&self, customer_id: &str) -> Option<DateTime<Utc>> {
        let store = self.session_store();
        let active = store
            .active_sessions()
            .into_iter()
            .filter(|s| s.customer_id.as_deref() == Some(customer_id))
            .map(|s| s.start_time)
            .max();
        let archived = store
            .journeys()
            .into_iter()
            .filter(|j| j.customer_id.as_deref() == Some(customer_id))
            .map(|j| j.started_at)
            .max();
        active.max(archived)
    }
}

/// Bounded retry with backoff for action dispatch. The default fires once,
/// matching the historical no-retry behavior.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: StdDuration,
}

impl RetryPolicy {
    pub fn fire_once() -> Self {
        Self {
            max_attempts: 1,
            backoff: StdDuration::from_secs(0),
        }
    }

    pub fn new(max_attempts: u32, backoff: StdDuration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

/// Applies a lifecycle transition through the instance state machine. A
/// same-state move is a no-op; an out-of-graph move is a bug, logged and
/// left unapplied.
fn set_state(instance: &mut WorkflowInstance, to: WorkflowState) {
    if instance.state == to {
        return;
    }
    if let Err(e) = instance.transition(to) {
        warn!(
            automation_id = %instance.automation_id,
            customer_id = %instance.customer_id,
            error = %e,
            "Rejected workflow state transition"
        );
    }
}

/// Result of a trigger attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A live instance already exists for the (automation, customer) pair.
    AlreadyActive,
    /// An entry condition failed; no instance was created.
    DeclinedEntry,
    UnknownAutomation,
}

/// Result of advancing an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A delayed step was persisted and queued.
    Scheduled,
    Completed,
    Stopped,
}

/// Core orchestration engine for multi-step automations.
pub struct WorkflowEngine {
    definitions: DashMap<String, WorkflowDefinition>,
    instances: TtlMap<WorkflowInstance>,
    jobs: TimeQueue<ScheduledJob>,
    instance_ttl: StdDuration,
    retry: RetryPolicy,
    dispatcher: Arc<dyn NotificationDispatcher>,
    orders: Arc<dyn OrderHistory>,
    directory: Arc<dyn CustomerDirectory>,
    activity: Arc<dyn ActivitySource>,
}

impl WorkflowEngine {
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        orders: Arc<dyn OrderHistory>,
        directory: Arc<dyn CustomerDirectory>,
        activity: Arc<dyn ActivitySource>,
    ) -> Self {
        Self {
            definitions: DashMap::new(),
            instances: TtlMap::new(),
            jobs: TimeQueue::new(),
            instance_ttl: StdDuration::from_secs(30 * 24 * 3600),
            retry: RetryPolicy::fire_once(),
            dispatcher,
            orders,
            directory,
            activity,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_instance_ttl(mut self, ttl: StdDuration) -> Self {
        self.instance_ttl = ttl;
        self
    }

    pub fn register(&self, definition: WorkflowDefinition) {
        info!(
            automation_id = %definition.automation_id,
            steps = definition.steps.len(),
            "Registered automation"
        );
        self.definitions
            .insert(definition.automation_id.clone(), definition);
    }

    pub fn definition(&self, automation_id: &str) -> Option<WorkflowDefinition> {
        self.definitions.get(automation_id).map(|r| r.clone())
    }

    pub fn has_live_instance(&self, automation_id: &str, customer_id: &str) -> bool {
        self.instances
            .contains(&instance_key(automation_id, customer_id))
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Starts the automation for the customer. A no-op when a live
    /// instance already exists for the pair; entry conditions are
    /// evaluated fail-closed before anything is created. On success the
    /// instance starts at step 0 and step 0 is attempted immediately.
    pub fn trigger_workflow(
        &self,
        automation_id: &str,
        customer_id: &str,
        context: HashMap<String, serde_json::Value>,
    ) -> TriggerOutcome {
        self.trigger_workflow_at(automation_id, customer_id, context, Utc::now())
    }

    pub fn trigger_workflow_at(
        &self,
        automation_id: &str,
        customer_id: &str,
        context: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> TriggerOutcome {
        let Some(definition) = self.definition(automation_id) else {
            warn!(automation_id, "Trigger for unknown automation");
            return TriggerOutcome::UnknownAutomation;
        };

        if self.has_live_instance(automation_id, customer_id) {
            debug!(automation_id, customer_id, "Trigger ignored, instance live");
            return TriggerOutcome::AlreadyActive;
        }

        let instance = WorkflowInstance::new(automation_id, customer_id, context, now);
        if !self.entry_conditions_met(&definition, &instance) {
            debug!(automation_id, customer_id, "Entry conditions not met");
            return TriggerOutcome::DeclinedEntry;
        }

        info!(automation_id, customer_id, "Workflow started");
        self.advance(instance, &definition, false, now);
        TriggerOutcome::Started
    }

    /// Pops every due job and processes it: stop conditions first, then
    /// step execution. Each job is consumed exactly once, action failures
    /// included. Returns the number of jobs processed.
    pub fn sweep_due_jobs(&self, now: DateTime<Utc>) -> usize {
        let due = self.jobs.pop_due(now);
        let count = due.len();
        for job in due {
            self.process_due_job(job, now);
        }
        count
    }

    fn process_due_job(&self, job: ScheduledJob, now: DateTime<Utc>) -> StepOutcome {
        let key = job.instance.key();
        let Some(definition) = self.definition(&job.automation_id) else {
            warn!(
                automation_id = %job.automation_id,
                "Due job for unknown automation, dropping instance"
            );
            let mut instance = job.instance;
            set_state(&mut instance, WorkflowState::Stopped);
            self.instances.remove(&key);
            return StepOutcome::Stopped;
        };

        if let Some(matched) = self.check_stop_conditions(&job.instance, &definition, now) {
            info!(
                automation_id = %job.automation_id,
                customer_id = %job.instance.customer_id,
                stop_condition = matched.label(),
                "Workflow stopped before step execution"
            );
            let mut instance = job.instance;
            set_state(&mut instance, WorkflowState::Stopped);
            self.instances.remove(&key);
            return StepOutcome::Stopped;
        }

        self.advance(job.instance, &definition, true, now)
    }

    /// Runs steps from the instance's current index. Zero-delay steps are
    /// chained in a loop bounded by the sequence length; a positive delay
    /// persists the instance and queues a job. `due` marks the first step
    /// as having already served its delay.
    fn advance(
        &self,
        mut instance: WorkflowInstance,
        definition: &WorkflowDefinition,
        mut due: bool,
        now: DateTime<Utc>,
    ) -> StepOutcome {
        let key = instance.key();
        loop {
            if instance.current_step_index >= definition.steps.len() {
                info!(
                    automation_id = %instance.automation_id,
                    customer_id = %instance.customer_id,
                    "Workflow completed"
                );
                set_state(&mut instance, WorkflowState::Completed);
                self.instances.remove(&key);
                return StepOutcome::Completed;
            }

            let step = &definition.steps[instance.current_step_index];

            if step.delay_ms > 0 && !due {
                let execute_at = now + Duration::milliseconds(step.delay_ms as i64);
                set_state(&mut instance, WorkflowState::Pending);
                self.instances
                    .put(key.clone(), instance.clone(), self.instance_ttl);
                self.jobs.push(
                    execute_at,
                    ScheduledJob {
                        execute_at,
                        automation_id: instance.automation_id.clone(),
                        instance,
                    },
                );
                return StepOutcome::Scheduled;
            }

            // Step conditions are evaluated when the action is about to
            // run, after any delay has elapsed.
            if let Some(condition) = &step.condition {
                if !self.step_condition_met(condition, &instance, now) {
                    debug!(
                        automation_id = %instance.automation_id,
                        step = instance.current_step_index,
                        "Step condition false, skipping without executing"
                    );
                    instance.current_step_index += 1;
                    due = false;
                    continue;
                }
            }

            set_state(&mut instance, WorkflowState::Executing);
            if let Err(e) = self.run_action(step, &instance) {
                warn!(
                    automation_id = %instance.automation_id,
                    customer_id = %instance.customer_id,
                    step = instance.current_step_index,
                    error = %e,
                    "Step action failed; continuing sequence"
                );
            }
            instance.current_step_index += 1;
            set_state(&mut instance, WorkflowState::Advancing);
            due = false;
        }
    }

    /// Entry gates. Evaluation problems count as "not met" so a workflow
    /// never starts on bad data.
    fn entry_conditions_met(
        &self,
        definition: &WorkflowDefinition,
        instance: &WorkflowInstance,
    ) -> bool {
        definition.entry_conditions.iter().all(|condition| {
            match condition {
                EntryCondition::MinCartValue { amount } => instance
                    .context
                    .get("cart_value")
                    .and_then(|v| v.as_f64())
                    .map(|v| v >= *amount)
                    .unwrap_or(false),
                EntryCondition::HasEmail => self
                    .directory
                    .profile(&instance.customer_id)
                    .and_then(|p| p.email)
                    .is_some(),
                EntryCondition::VipTier { min_spend } => {
                    let spent: f64 = self
                        .orders
                        .orders_for(&instance.customer_id)
                        .iter()
                        .map(|o| o.amount)
                        .sum();
                    spent >= *min_spend
                }
            }
        })
    }

    fn step_condition_met(
        &self,
        condition: &StepCondition,
        instance: &WorkflowInstance,
        now: DateTime<Utc>,
    ) -> bool {
        match condition {
            StepCondition::NoRecentPurchase { hours } => {
                let cutoff = now - Duration::hours(*hours);
                !self
                    .orders
                    .orders_for(&instance.customer_id)
                    .iter()
                    .any(|o| o.placed_at > cutoff)
            }
            StepCondition::StillSubscribed => self
                .directory
                .profile(&instance.customer_id)
                .map(|p| p.subscribed)
                .unwrap_or(false),
        }
    }

    /// First matching stop condition, if any. Evaluation problems count as
    /// "not met" so a workflow is never stopped on bad data.
    pub fn check_stop_conditions(
        &self,
        instance: &WorkflowInstance,
        definition: &WorkflowDefinition,
        now: DateTime<Utc>,
    ) -> Option<StopCondition> {
        definition
            .stop_conditions
            .iter()
            .find(|condition| match condition {
                StopCondition::OrderPlacedSinceStart => self
                    .orders
                    .orders_for(&instance.customer_id)
                    .iter()
                    .any(|o| o.placed_at > instance.started_at),
                StopCondition::CartModifiedSinceStart => self
                    .activity
                    .last_cart_activity(&instance.customer_id)
                    .map(|at| at > instance.started_at)
                    .unwrap_or(false),
                StopCondition::Unsubscribed => self
                    .directory
                    .profile(&instance.customer_id)
                    .map(|p| !p.subscribed)
                    .unwrap_or(false),
                StopCondition::NewSessionWithin { hours } => self
                    .activity
                    .last_session_start(&instance.customer_id)
                    .map(|at| at > now - Duration::hours(*hours) && at > instance.started_at)
                    .unwrap_or(false),
            })
            .cloned()
    }

    fn run_action(&self, step: &WorkflowStep, instance: &WorkflowInstance) -> Result<()> {
        let variables = resolve_variables(
            &step.action.variables,
            &instance.customer_id,
            &instance.context,
            &self.orders,
            &self.directory,
        );
        let message = RenderedMessage {
            subject: step
                .action
                .subject
                .as_ref()
                .map(|s| render(s, &variables)),
            body: render(&step.action.template, &variables),
        };

        let profile = self.directory.profile(&instance.customer_id);
        let recipient = match step.action.channel {
            MessageChannel::Email => profile.and_then(|p| p.email).ok_or_else(|| {
                anyhow::anyhow!("no email on file for {}", instance.customer_id)
            })?,
            MessageChannel::Chat => profile
                .and_then(|p| p.phone)
                .unwrap_or_else(|| instance.customer_id.clone()),
        };

        let mut last_err = None;
        for attempt in 1..=self.retry.max_attempts {
            match self
                .dispatcher
                .send(step.action.channel, &recipient, &message)
            {
                Ok(()) => {
                    debug!(
                        automation_id = %instance.automation_id,
                        step = instance.current_step_index,
                        channel = ?step.action.channel,
                        "Step action dispatched"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        automation_id = %instance.automation_id,
                        step = instance.current_step_index,
                        attempt,
                        error = %e,
                        "Dispatch attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < self.retry.max_attempts && !self.retry.backoff.is_zero() {
                        std::thread::sleep(self.retry.backoff);
                    }
                }
            }
        }
        Err(last_err
            .map(Into::into)
            .unwrap_or_else(|| anyhow::anyhow!("dispatch failed")))
    }
}

/// Registers the stock automations: the cart-recovery email sequence and
/// the at-risk VIP win-back.
pub fn seed_default_automations(engine: &WorkflowEngine) {
    use crate::variables::TemplateVariable;

    engine.register(WorkflowDefinition {
        automation_id: "cart_recovery_email".to_string(),
        trigger_event: "cart_abandoned".to_string(),
        entry_conditions: vec![
            EntryCondition::MinCartValue { amount: 25.0 },
            EntryCondition::HasEmail,
        ],
        steps: vec![
            WorkflowStep {
                delay_ms: 3_600_000,
                condition: Some(StepCondition::NoRecentPurchase { hours: 1 }),
                action: crate::types::StepAction {
                    channel: MessageChannel::Email,
                    subject: Some("You left something behind, {{first_name}}".to_string()),
                    template: "Hi {{first_name}}, your cart ({{cart_items}}) worth \
                               {{cart_total}} is still waiting."
                        .to_string(),
                    variables: vec![
                        TemplateVariable::FirstName,
                        TemplateVariable::CartItems,
                        TemplateVariable::CartTotal,
                    ],
                },
            },
            WorkflowStep {
                delay_ms: 86_400_000,
                condition: Some(StepCondition::NoRecentPurchase { hours: 24 }),
                action: crate::types::StepAction {
                    channel: MessageChannel::Email,
                    subject: Some("A little something to sweeten the deal".to_string()),
                    template: "Still thinking it over? Use {{discount_code}} on \
                               {{cart_items}} before it expires."
                        .to_string(),
                    variables: vec![TemplateVariable::DiscountCode, TemplateVariable::CartItems],
                },
            },
        ],
        stop_conditions: vec![
            StopCondition::OrderPlacedSinceStart,
            StopCondition::Unsubscribed,
        ],
    });

    engine.register(WorkflowDefinition {
        automation_id: "vip_winback".to_string(),
        trigger_event: "vip_at_risk".to_string(),
        entry_conditions: vec![EntryCondition::HasEmail],
        steps: vec![WorkflowStep {
            delay_ms: 0,
            condition: Some(StepCondition::StillSubscribed),
            action: crate::types::StepAction {
                channel: MessageChannel::Email,
                subject: Some("We miss you, {{first_name}}".to_string()),
                template: "It has been a while since {{last_order_date}}. Here is \
                           {{discount_code}}, and a few picks for you: \
                           {{personalized_products}}."
                    .to_string(),
                variables: vec![
                    TemplateVariable::FirstName,
                    TemplateVariable::LastOrderDate,
                    TemplateVariable::DiscountCode,
                    TemplateVariable::PersonalizedProducts,
                ],
            },
        }],
        stop_conditions: vec![
            StopCondition::OrderPlacedSinceStart,
            StopCondition::Unsubscribed,
        ],
    });
}
