//! Collaborator seams — traits for the external systems this subsystem
//! reads from or dispatches to.
//!
//! Engines accept `Arc<dyn Trait>` handles so production wiring and tests
//! can substitute implementations freely. In-memory implementations are
//! provided for wiring, development and tests.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{PulseError, PulseResult};
use crate::types::{CustomerProfile, MessageChannel, Order, RenderedMessage};

/// Read-only access to non-cancelled order history.
pub trait OrderHistory: Send + Sync {
    /// All non-cancelled orders for the customer, oldest first.
    fn orders_for(&self, customer_id: &str) -> Vec<Order>;

    /// Every customer id with at least one order. Drives full recompute
    /// sweeps.
    fn customer_ids(&self) -> Vec<String>;
}

/// Read-only access to basic customer identity fields.
pub trait CustomerDirectory: Send + Sync {
    fn profile(&self, customer_id: &str) -> Option<CustomerProfile>;
}

/// Outbound message dispatch. Failures are terminal per attempt; retry is
/// the caller's concern.
pub trait NotificationDispatcher: Send + Sync {
    fn send(
        &self,
        channel: MessageChannel,
        recipient: &str,
        message: &RenderedMessage,
    ) -> PulseResult<()>;
}

/// No-op dispatcher for modules that do not need delivery.
pub struct NoopDispatcher;

impl NotificationDispatcher for NoopDispatcher {
    fn send(
        &self,
        _channel: MessageChannel,
        _recipient: &str,
        _message: &RenderedMessage,
    ) -> PulseResult<()> {
        Ok(())
    }
}

/// A message captured by [`CaptureDispatcher`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub channel: MessageChannel,
    pub recipient: String,
    pub message: RenderedMessage,
    pub sent_at: DateTime<Utc>,
}

/// In-memory dispatcher that records every send for test assertions. Can be
/// switched into failure mode to exercise error paths.
#[derive(Default)]
pub struct CaptureDispatcher {
    sent: Mutex<Vec<SentMessage>>,
    fail_all: std::sync::atomic::AtomicBool,
}

impl CaptureDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("dispatcher mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().expect("dispatcher mutex poisoned").len()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }
}

impl NotificationDispatcher for CaptureDispatcher {
    fn send(
        &self,
        channel: MessageChannel,
        recipient: &str,
        message: &RenderedMessage,
    ) -> PulseResult<()> {
        if self.fail_all.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PulseError::Dispatch("capture dispatcher failing".into()));
        }
        self.sent
            .lock()
            .expect("dispatcher mutex poisoned")
            .push(SentMessage {
                channel,
                recipient: recipient.to_string(),
                message: message.clone(),
                sent_at: Utc::now(),
            });
        Ok(())
    }
}

/// In-memory order history keyed by customer id.
#[derive(Default)]
pub struct InMemoryOrderHistory {
    orders: DashMap<String, Vec<Order>>,
}

impl InMemoryOrderHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_order(&self, order: Order) {
        self.orders
            .entry(order.customer_id.clone())
            .or_default()
            .push(order);
    }
}

impl OrderHistory for InMemoryOrderHistory {
    fn orders_for(&self, customer_id: &str) -> Vec<Order> {
        let mut orders = self
            .orders
            .get(customer_id)
            .map(|r| r.clone())
            .unwrap_or_default();
        orders.sort_by_key(|o| o.placed_at);
        orders
    }

    fn customer_ids(&self) -> Vec<String> {
        self.orders.iter().map(|r| r.key().clone()).collect()
    }
}

/// In-memory customer directory.
#[derive(Default)]
pub struct InMemoryDirectory {
    profiles: DashMap<String, CustomerProfile>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, profile: CustomerProfile) {
        self.profiles.insert(profile.customer_id.clone(), profile);
    }
}

impl CustomerDirectory for InMemoryDirectory {
    fn profile(&self, customer_id: &str) -> Option<CustomerProfile> {
        self.profiles.get(customer_id).map(|r| r.clone())
    }
}

/// Convenience: a no-op dispatcher handle.
pub fn noop_dispatcher() -> Arc<dyn NotificationDispatcher> {
    Arc::new(NoopDispatcher)
}

/// Convenience: a capture dispatcher handle for tests.
pub fn capture_dispatcher() -> Arc<CaptureDispatcher> {
    Arc::new(CaptureDispatcher::new())
}
