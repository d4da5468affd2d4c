//! Event ingestion and real-time counters.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use pulse_core::types::{
    BehaviorEvent, DeviceInfo, EventName, EventPayload, Session,
};

use crate::session::SessionStore;

/// Per-product denormalized counters.
#[derive(Debug, Clone, Default)]
pub struct ProductStats {
    pub views: u64,
    pub cart_adds: u64,
    pub purchases: u64,
}

/// Point-in-time read snapshot of the tracker counters. Consumed by the
/// insight generator and the dashboard query surface.
#[derive(Debug, Clone, Default)]
pub struct TrackerSnapshot {
    pub total_events: u64,
    pub event_counts: HashMap<&'static str, u64>,
    pub page_views: u64,
    pub orders: u64,
    pub carts_created: u64,
    pub carts_converted: u64,
    pub carts_abandoned: u64,
    pub bounces: u64,
    pub sessions_ended: u64,
    pub revenue_by_day: HashMap<NaiveDate, f64>,
    pub product_stats: HashMap<String, ProductStats>,
}

impl TrackerSnapshot {
    /// Fraction of created carts that were neither converted nor still
    /// open, in [0, 1].
    pub fn cart_abandonment_rate(&self) -> f64 {
        if self.carts_created == 0 {
            return 0.0;
        }
        self.carts_abandoned as f64 / self.carts_created as f64
    }

    /// Orders per page view, in [0, 1].
    pub fn conversion_rate(&self) -> f64 {
        if self.page_views == 0 {
            return 0.0;
        }
        self.orders as f64 / self.page_views as f64
    }

    /// Single-page sessions per ended session, in [0, 1].
    pub fn bounce_rate(&self) -> f64 {
        if self.sessions_ended == 0 {
            return 0.0;
        }
        self.bounces as f64 / self.sessions_ended as f64
    }
}

/// An open cart that has gone quiet. Feeds the cart-recovery trigger sweep.
#[derive(Debug, Clone)]
pub struct AbandonedCart {
    pub session_id: Uuid,
    pub visitor_id: String,
    pub customer_id: Option<String>,
    pub cart_value: f64,
    pub items: Vec<String>,
    pub last_cart_activity: DateTime<Utc>,
}

/// Hot-path event recorder. Only mutates fast counters and bounded
/// in-memory structures; every entry point is best-effort and never
/// surfaces an error to the caller.
pub struct EventTracker {
    sessions: Arc<SessionStore>,
    recent: Mutex<VecDeque<BehaviorEvent>>,
    ring_capacity: usize,
    event_counts: DashMap<EventName, u64>,
    total_events: AtomicU64,
    carts_created: AtomicU64,
    carts_converted: AtomicU64,
    carts_abandoned: AtomicU64,
    bounces: AtomicU64,
    sessions_ended: AtomicU64,
    revenue_by_day: DashMap<NaiveDate, f64>,
    products: DashMap<String, ProductStats>,
    /// Sessions already reported as abandoned, so repeated sweeps do not
    /// double count.
    flagged_abandoned: DashMap<Uuid, ()>,
}

impl EventTracker {
    pub fn new(sessions: Arc<SessionStore>, ring_buffer_size: usize) -> Self {
        Self {
            sessions,
            recent: Mutex::new(VecDeque::with_capacity(ring_buffer_size)),
            ring_capacity: ring_buffer_size,
            event_counts: DashMap::new(),
            total_events: AtomicU64::new(0),
            carts_created: AtomicU64::new(0),
            carts_converted: AtomicU64::new(0),
            carts_abandoned: AtomicU64::new(0),
            bounces: AtomicU64::new(0),
            sessions_ended: AtomicU64::new(0),
            revenue_by_day: DashMap::new(),
            products: DashMap::new(),
            flagged_abandoned: DashMap::new(),
        }
    }

    pub fn session_store(&self) -> Arc<SessionStore> {
        self.sessions.clone()
    }

    /// Registers a page hit: resolves the live session (starting one if
    /// needed) and records a `page_view` event on it. Returns the session
    /// id for subsequent event calls.
    pub fn track_page(
        &self,
        visitor_id: &str,
        customer_id: Option<&str>,
        page: &str,
        referrer: Option<&str>,
        device: DeviceInfo,
    ) -> Uuid {
        let now = Utc::now();
        let (session_id, archived) =
            self.sessions
                .touch(visitor_id, customer_id, page, referrer, device, now);
        if let Some(journey) = archived {
            self.note_session_end(journey.bounced);
        }
        self.record_event(
            session_id,
            EventName::PageView,
            EventPayload::Page {
                url: page.to_string(),
            },
            customer_id,
        );
        session_id
    }

    /// Appends the event to the session event list, the global ring buffer
    /// and the per-name counter, then applies the denormalized business
    /// counters. Unknown sessions are logged and dropped; this path never
    /// fails the caller.
    pub fn record_event(
        &self,
        session_id: Uuid,
        name: EventName,
        payload: EventPayload,
        customer_id: Option<&str>,
    ) {
        let event = BehaviorEvent {
            name,
            category: name.category(),
            timestamp: Utc::now(),
            session_id,
            customer_id: customer_id.map(str::to_string),
            payload,
        };

        let first_cart_event = match self.sessions.get_session(session_id) {
            Some(session) => {
                name == EventName::AddToCart
                    && !session.events.iter().any(|e| e.name == EventName::AddToCart)
            }
            None => {
                warn!(%session_id, name = name.as_str(), "Event for unknown session dropped");
                return;
            }
        };
        if !self.sessions.append_event(session_id, event.clone()) {
            warn!(%session_id, name = name.as_str(), "Event for unknown session dropped");
            return;
        }

        metrics::counter!("pulse.events_recorded", "name" => name.as_str()).increment(1);
        *self.event_counts.entry(name).or_insert(0) += 1;
        self.total_events.fetch_add(1, Ordering::Relaxed);

        {
            let mut recent = self.recent.lock();
            if recent.len() == self.ring_capacity {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        self.apply_business_counters(&event, first_cart_event);
    }

    /// Ends every idle session, folding their bounce outcomes into the
    /// counters. Returns how many were expired.
    pub fn expire_idle_sessions(&self, now: DateTime<Utc>) -> usize {
        let journeys = self.sessions.expire_idle(now);
        for journey in &journeys {
            self.note_session_end(journey.bounced);
        }
        journeys.len()
    }

    /// Most recent events, newest last, at most `limit`.
    pub fn recent_events(&self, limit: usize) -> Vec<BehaviorEvent> {
        let recent = self.recent.lock();
        recent
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Sessions holding a cart that saw no order and no cart activity for
    /// at least `quiet_for`. Each session is reported once across sweeps.
    pub fn abandoned_carts(
        &self,
        quiet_for: Duration,
        min_value: f64,
        now: DateTime<Utc>,
    ) -> Vec<AbandonedCart> {
        let mut found = Vec::new();
        for session in self.sessions.active_sessions() {
            if self.flagged_abandoned.contains_key(&session.id) {
                continue;
            }
            if let Some(cart) = open_cart(&session, quiet_for, min_value, now) {
                self.flagged_abandoned.insert(session.id, ());
                self.carts_abandoned.fetch_add(1, Ordering::Relaxed);
                debug!(
                    session_id = %session.id,
                    cart_value = cart.cart_value,
                    "Abandoned cart detected"
                );
                found.push(cart);
            }
        }
        found
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> TrackerSnapshot {
        let mut event_counts = HashMap::new();
        for entry in self.event_counts.iter() {
            event_counts.insert(entry.key().as_str(), *entry.value());
        }
        TrackerSnapshot {
            total_events: self.total_events.load(Ordering::Relaxed),
            page_views: event_counts
                .get(EventName::PageView.as_str())
                .copied()
                .unwrap_or(0),
            orders: event_counts
                .get(EventName::OrderComplete.as_str())
                .copied()
                .unwrap_or(0),
            event_counts,
            carts_created: self.carts_created.load(Ordering::Relaxed),
            carts_converted: self.carts_converted.load(Ordering::Relaxed),
            carts_abandoned: self.carts_abandoned.load(Ordering::Relaxed),
            bounces: self.bounces.load(Ordering::Relaxed),
            sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
            revenue_by_day: self
                .revenue_by_day
                .iter()
                .map(|r| (*r.key(), *r.value()))
                .collect(),
            product_stats: self
                .products
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect(),
        }
    }

    fn note_session_end(&self, bounced: bool) {
        self.sessions_ended.fetch_add(1, Ordering::Relaxed);
        if bounced {
            self.bounces.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn apply_business_counters(&self, event: &BehaviorEvent, first_cart_event: bool) {
        match (&event.name, &event.payload) {
            (EventName::ViewProduct, EventPayload::Product { product_id, .. }) => {
                self.products.entry(product_id.clone()).or_default().views += 1;
            }
            (EventName::AddToCart, payload) => {
                if first_cart_event {
                    self.carts_created.fetch_add(1, Ordering::Relaxed);
                }
                if let EventPayload::Product { product_id, .. } = payload {
                    self.products
                        .entry(product_id.clone())
                        .or_default()
                        .cart_adds += 1;
                }
            }
            (EventName::OrderComplete, EventPayload::Order { total, .. }) => {
                self.carts_converted.fetch_add(1, Ordering::Relaxed);
                let day = event.timestamp.date_naive();
                *self.revenue_by_day.entry(day).or_insert(0.0) += total;
            }
            _ => {}
        }
    }
}

/// Checks a single session for an open, quiet cart worth recovering.
fn open_cart(
    session: &Session,
    quiet_for: Duration,
    min_value: f64,
    now: DateTime<Utc>,
) -> Option<AbandonedCart> {
    let last_cart_event = session
        .events
        .iter()
        .filter(|e| e.name == EventName::AddToCart)
        .last()?;

    if session
        .events
        .iter()
        .any(|e| e.name == EventName::OrderComplete)
    {
        return None;
    }
    if now - last_cart_event.timestamp < quiet_for {
        return None;
    }

    // Prefer the cart payload for value/items; fall back to the product
    // price when only product payloads were sent.
    let (cart_value, items) = match &last_cart_event.payload {
        EventPayload::Cart {
            cart_value, items, ..
        } => (*cart_value, items.clone()),
        EventPayload::Product { product_id, price } => (*price, vec![product_id.clone()]),
        _ => (0.0, Vec::new()),
    };
    if cart_value < min_value {
        return None;
    }

    Some(AbandonedCart {
        session_id: session.id,
        visitor_id: session.visitor_id.clone(),
        customer_id: session.customer_id.clone(),
        cart_value,
        items,
        last_cart_activity: last_cart_event.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> EventTracker {
        EventTracker::new(Arc::new(SessionStore::new(30)), 5)
    }

    #[test]
    fn test_record_event_appends_and_counts() {
        let tracker = tracker();
        let session_id = tracker.track_page("v1", None, "/home", None, DeviceInfo::default());
        tracker.record_event(
            session_id,
            EventName::ViewProduct,
            EventPayload::Product {
                product_id: "sku-1".into(),
                price: 19.99,
            },
            None,
        );

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total_events, 2);
        assert_eq!(snapshot.page_views, 1);
        assert_eq!(snapshot.product_stats.get("sku-1").unwrap().views, 1);

        let session = tracker.session_store().get_session(session_id).unwrap();
        assert_eq!(session.events.len(), 2);
    }

    #[test]
    fn test_unknown_session_swallowed() {
        let tracker = tracker();
        // Must not panic or error.
        tracker.record_event(Uuid::new_v4(), EventName::Search, EventPayload::Empty, None);
        assert_eq!(tracker.snapshot().total_events, 0);
    }

    #[test]
    fn test_ring_buffer_bounded() {
        let tracker = tracker();
        let session_id = tracker.track_page("v1", None, "/", None, DeviceInfo::default());
        for _ in 0..10 {
            tracker.record_event(session_id, EventName::Search, EventPayload::Empty, None);
        }
        assert_eq!(tracker.recent_events(100).len(), 5);
        assert_eq!(tracker.snapshot().total_events, 11);
    }

    #[test]
    fn test_cart_created_once_per_session() {
        let tracker = tracker();
        let session_id = tracker.track_page("v1", None, "/", None, DeviceInfo::default());
        for _ in 0..3 {
            tracker.record_event(
                session_id,
                EventName::AddToCart,
                EventPayload::Product {
                    product_id: "sku-2".into(),
                    price: 10.0,
                },
                None,
            );
        }

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.carts_created, 1);
        assert_eq!(snapshot.product_stats.get("sku-2").unwrap().cart_adds, 3);
    }

    #[test]
    fn test_order_complete_updates_revenue() {
        let tracker = tracker();
        let session_id = tracker.track_page("v1", Some("c1"), "/", None, DeviceInfo::default());
        tracker.record_event(
            session_id,
            EventName::OrderComplete,
            EventPayload::Order {
                order_id: "o1".into(),
                total: 120.0,
            },
            Some("c1"),
        );

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.carts_converted, 1);
        let today = Utc::now().date_naive();
        assert_eq!(snapshot.revenue_by_day.get(&today), Some(&120.0));
    }

    #[test]
    fn test_abandoned_cart_detected_once() {
        let tracker = tracker();
        let session_id = tracker.track_page("v1", Some("c1"), "/", None, DeviceInfo::default());
        tracker.record_event(
            session_id,
            EventName::AddToCart,
            EventPayload::Cart {
                cart_value: 80.0,
                item_count: 2,
                items: vec!["sku-1".into(), "sku-2".into()],
            },
            Some("c1"),
        );

        let later = Utc::now() + Duration::minutes(20);
        let found = tracker.abandoned_carts(Duration::minutes(15), 25.0, later);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].cart_value, 80.0);
        assert_eq!(found[0].customer_id.as_deref(), Some("c1"));

        // Second sweep must not report the same cart.
        assert!(tracker
            .abandoned_carts(Duration::minutes(15), 25.0, later)
            .is_empty());
        assert_eq!(tracker.snapshot().carts_abandoned, 1);
    }

    #[test]
    fn test_cart_below_threshold_ignored() {
        let tracker = tracker();
        let session_id = tracker.track_page("v1", None, "/", None, DeviceInfo::default());
        tracker.record_event(
            session_id,
            EventName::AddToCart,
            EventPayload::Cart {
                cart_value: 10.0,
                item_count: 1,
                items: vec!["sku-1".into()],
            },
            None,
        );

        let later = Utc::now() + Duration::minutes(20);
        assert!(tracker
            .abandoned_carts(Duration::minutes(15), 25.0, later)
            .is_empty());
    }

    #[test]
    fn test_bounce_counted_on_expiry() {
        let tracker = tracker();
        tracker.track_page("v1", None, "/only-page", None, DeviceInfo::default());
        let expired = tracker.expire_idle_sessions(Utc::now() + Duration::minutes(31));
        assert_eq!(expired, 1);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.bounces, 1);
        assert_eq!(snapshot.sessions_ended, 1);
        assert_eq!(snapshot.bounce_rate(), 1.0);
    }
}
