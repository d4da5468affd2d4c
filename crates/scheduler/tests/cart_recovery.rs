//! End-to-end cart recovery: browse, abandon, sweep, deliver, and the
//! stop-condition path where the customer buys before the follow-up.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use pulse_automation::{seed_default_automations, WorkflowEngine};
use pulse_core::collaborators::{
    capture_dispatcher, CaptureDispatcher, CustomerDirectory, InMemoryDirectory,
    InMemoryOrderHistory,
};
use pulse_core::config::SchedulerConfig;
use pulse_core::types::{CustomerProfile, DeviceInfo, EventName, EventPayload, Order};
use pulse_scheduler::sweeps::{sweep_abandoned_carts, CART_RECOVERY_AUTOMATION};
use pulse_tracking::{EventTracker, SessionStore};

struct World {
    tracker: Arc<EventTracker>,
    engine: WorkflowEngine,
    dispatcher: Arc<CaptureDispatcher>,
    orders: Arc<InMemoryOrderHistory>,
    config: SchedulerConfig,
}

fn world() -> World {
    let dispatcher = capture_dispatcher();
    let orders = Arc::new(InMemoryOrderHistory::new());
    let directory = Arc::new(InMemoryDirectory::new());
    directory.upsert(CustomerProfile {
        customer_id: "cust-42".into(),
        first_name: "Maya".into(),
        email: Some("maya@example.com".into()),
        phone: None,
        subscribed: true,
    });

    let tracker = Arc::new(EventTracker::new(Arc::new(SessionStore::new(30)), 1000));
    let engine = WorkflowEngine::new(
        dispatcher.clone(),
        orders.clone(),
        directory.clone() as Arc<dyn CustomerDirectory>,
        tracker.clone(),
    );
    seed_default_automations(&engine);

    World {
        tracker,
        engine,
        dispatcher,
        orders,
        config: SchedulerConfig::default(),
    }
}

fn browse_and_abandon(world: &World) {
    let session_id = world.tracker.track_page(
        "visitor-9",
        Some("cust-42"),
        "/products/mug",
        Some("https://search.example.com"),
        DeviceInfo::default(),
    );
    world.tracker.record_event(
        session_id,
        EventName::ViewProduct,
        EventPayload::Product {
            product_id: "sku-mug".into(),
            price: 45.0,
        },
        Some("cust-42"),
    );
    world.tracker.record_event(
        session_id,
        EventName::AddToCart,
        EventPayload::Cart {
            cart_value: 90.0,
            item_count: 2,
            items: vec!["Blue Mug".into(), "Red Mug".into()],
        },
        Some("cust-42"),
    );
}

#[test]
fn test_full_cart_recovery_delivery() {
    let world = world();
    browse_and_abandon(&world);

    // Cart goes quiet past the lookback window.
    let sweep_at = Utc::now() + Duration::minutes(90);
    let started = sweep_abandoned_carts(&world.tracker, &world.engine, &world.config, sweep_at);
    assert_eq!(started, 1);
    assert!(world
        .engine
        .has_live_instance(CART_RECOVERY_AUTOMATION, "cust-42"));

    // First recovery email is delayed an hour; deliver it.
    world.engine.sweep_due_jobs(sweep_at + Duration::minutes(61));
    let sent = world.dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "maya@example.com");
    assert!(sent[0].message.body.contains("Blue Mug, Red Mug"));
    assert!(sent[0].message.body.contains("$90.00"));
    let subject = sent[0].message.subject.as_deref().unwrap();
    assert!(subject.contains("Maya"));

    // Second email carries a discount code after a further day.
    world
        .engine
        .sweep_due_jobs(sweep_at + Duration::minutes(61) + Duration::hours(25));
    let sent = world.dispatcher.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].message.body.contains("SAVE-"));
    assert!(!world
        .engine
        .has_live_instance(CART_RECOVERY_AUTOMATION, "cust-42"));
}

#[test]
fn test_purchase_stops_recovery_sequence() {
    let world = world();
    browse_and_abandon(&world);

    let sweep_at = Utc::now() + Duration::minutes(90);
    sweep_abandoned_carts(&world.tracker, &world.engine, &world.config, sweep_at);

    // The customer completes the purchase before the first email is due.
    world.orders.record_order(Order {
        id: Uuid::new_v4(),
        customer_id: "cust-42".into(),
        amount: 90.0,
        placed_at: sweep_at + Duration::minutes(30),
    });

    let processed = world.engine.sweep_due_jobs(sweep_at + Duration::minutes(61));
    assert_eq!(processed, 1);
    // Stop condition fired first; no email, no live instance, no jobs.
    assert_eq!(world.dispatcher.count(), 0);
    assert!(!world
        .engine
        .has_live_instance(CART_RECOVERY_AUTOMATION, "cust-42"));
    assert_eq!(world.engine.pending_jobs(), 0);
}

#[test]
fn test_order_before_start_does_not_stop_sequence() {
    let world = world();

    // An unrelated order from well before the abandonment.
    world.orders.record_order(Order {
        id: Uuid::new_v4(),
        customer_id: "cust-42".into(),
        amount: 30.0,
        placed_at: Utc::now() - Duration::days(10),
    });
    browse_and_abandon(&world);

    let sweep_at = Utc::now() + Duration::minutes(90);
    sweep_abandoned_carts(&world.tracker, &world.engine, &world.config, sweep_at);

    world.engine.sweep_due_jobs(sweep_at + Duration::minutes(61));
    // Only orders placed after the workflow started stop it.
    assert_eq!(world.dispatcher.count(), 1);
    assert!(world
        .engine
        .has_live_instance(CART_RECOVERY_AUTOMATION, "cust-42"));
}
