//! Demo data seeding for local runs.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use pulse_core::collaborators::{InMemoryDirectory, InMemoryOrderHistory};
use pulse_core::types::{CustomerProfile, DeviceInfo, EventName, EventPayload, Order};
use pulse_tracking::EventTracker;

/// Seeds a handful of customers with order history, some live browsing
/// sessions and one cart left behind, so every sweep has something to do.
pub fn seed(
    tracker: &Arc<EventTracker>,
    orders: &Arc<InMemoryOrderHistory>,
    directory: &Arc<InMemoryDirectory>,
) {
    let now = Utc::now();

    let customers = [
        ("cust-ada", "Ada", "ada@example.com", true),
        ("cust-bo", "Bo", "bo@example.com", true),
        ("cust-cleo", "Cleo", "cleo@example.com", false),
    ];
    for (id, first_name, email, subscribed) in customers {
        directory.upsert(CustomerProfile {
            customer_id: id.to_string(),
            first_name: first_name.to_string(),
            email: Some(email.to_string()),
            phone: None,
            subscribed,
        });
    }

    // Ada is a loyal big spender, Bo a lapsed VIP, Cleo a one-time buyer.
    for days_ago in [3, 15, 32, 48, 66, 80] {
        orders.record_order(Order {
            id: Uuid::new_v4(),
            customer_id: "cust-ada".into(),
            amount: 180.0,
            placed_at: now - Duration::days(days_ago),
        });
    }
    for days_ago in [75, 95, 120, 150, 170] {
        orders.record_order(Order {
            id: Uuid::new_v4(),
            customer_id: "cust-bo".into(),
            amount: 260.0,
            placed_at: now - Duration::days(days_ago),
        });
    }
    orders.record_order(Order {
        id: Uuid::new_v4(),
        customer_id: "cust-cleo".into(),
        amount: 45.0,
        placed_at: now - Duration::days(8),
    });

    // A browsing session that ends in a purchase.
    let session = tracker.track_page(
        "visitor-ada",
        Some("cust-ada"),
        "/products/lamp",
        Some("https://search.example.com"),
        DeviceInfo::default(),
    );
    tracker.record_event(
        session,
        EventName::ViewProduct,
        EventPayload::Product {
            product_id: "sku-lamp".into(),
            price: 120.0,
        },
        Some("cust-ada"),
    );
    tracker.record_event(
        session,
        EventName::AddToCart,
        EventPayload::Cart {
            cart_value: 120.0,
            item_count: 1,
            items: vec!["Brass Lamp".into()],
        },
        Some("cust-ada"),
    );
    tracker.record_event(
        session,
        EventName::OrderComplete,
        EventPayload::Order {
            order_id: "demo-order-1".into(),
            total: 120.0,
        },
        Some("cust-ada"),
    );

    // A cart left behind, ready for the recovery sweep once it goes quiet.
    let session = tracker.track_page(
        "visitor-cleo",
        Some("cust-cleo"),
        "/products/mug",
        None,
        DeviceInfo::default(),
    );
    tracker.record_event(
        session,
        EventName::AddToCart,
        EventPayload::Cart {
            cart_value: 68.0,
            item_count: 2,
            items: vec!["Blue Mug".into(), "Red Mug".into()],
        },
        Some("cust-cleo"),
    );

    // An anonymous single-page visit that will count as a bounce.
    tracker.track_page("visitor-anon", None, "/landing", None, DeviceInfo::default());
}
