//! Domain types shared across the ShopPulse crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of behavioral event names the tracker accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    PageView,
    ViewProduct,
    AddToCart,
    RemoveFromCart,
    CheckoutStarted,
    OrderComplete,
    Search,
}

impl EventName {
    /// Coarse category used for analytics grouping.
    pub fn category(&self) -> EventCategory {
        match self {
            EventName::PageView => EventCategory::Browse,
            EventName::ViewProduct => EventCategory::Browse,
            EventName::AddToCart | EventName::RemoveFromCart => EventCategory::Cart,
            EventName::CheckoutStarted | EventName::OrderComplete => EventCategory::Order,
            EventName::Search => EventCategory::Search,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::PageView => "page_view",
            EventName::ViewProduct => "view_product",
            EventName::AddToCart => "add_to_cart",
            EventName::RemoveFromCart => "remove_from_cart",
            EventName::CheckoutStarted => "checkout_started",
            EventName::OrderComplete => "order_complete",
            EventName::Search => "search",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Browse,
    Cart,
    Order,
    Search,
}

/// Structured payload attached to a behavioral event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EventPayload {
    Page {
        url: String,
    },
    Product {
        product_id: String,
        price: f64,
    },
    Cart {
        cart_value: f64,
        item_count: u32,
        items: Vec<String>,
    },
    Order {
        order_id: String,
        total: f64,
    },
    Search {
        query: String,
        result_count: u32,
    },
    Empty,
}

/// A single recorded behavioral event. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub name: EventName,
    pub category: EventCategory,
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub customer_id: Option<String>,
    pub payload: EventPayload,
}

/// Device fingerprint captured at session start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: String,
    pub device_type: String,
    pub os: Option<String>,
}

/// One visitor session. Expires after 30 minutes of inactivity and is
/// archived into a journey record on end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub visitor_id: String,
    pub customer_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub pages: Vec<String>,
    pub events: Vec<BehaviorEvent>,
    pub entry_page: String,
    pub referrer: Option<String>,
    pub device: DeviceInfo,
}

/// Long-lived per-visitor aggregate, upserted on every session start and
/// activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorProfile {
    pub visitor_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub session_count: u64,
    pub total_page_views: u64,
}

/// Archived record of an ended session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedJourney {
    pub session_id: Uuid,
    pub visitor_id: String,
    pub customer_id: Option<String>,
    pub entry_page: String,
    pub exit_page: String,
    pub page_count: usize,
    pub event_count: usize,
    pub duration_secs: i64,
    pub bounced: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// A non-cancelled order as read from the order history collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: String,
    pub amount: f64,
    pub placed_at: DateTime<Utc>,
}

/// Basic customer identity fields used for template variable resolution and
/// the unsubscribed stop condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_id: String,
    pub first_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub subscribed: bool,
}

/// Outbound message channel kinds supported by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageChannel {
    Email,
    Chat,
}

/// A fully rendered outbound message ready for dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub body: String,
}
