//! Session lifecycle — creation, reuse, expiry and journey archival.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use pulse_core::types::{ArchivedJourney, BehaviorEvent, DeviceInfo, Session, VisitorProfile};

/// Owns active sessions, visitor profiles and the archive of ended
/// sessions (journeys).
pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
    /// visitor id -> active session id
    active_by_visitor: DashMap<String, Uuid>,
    visitors: DashMap<String, VisitorProfile>,
    journeys: Mutex<Vec<ArchivedJourney>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(session_timeout_mins: i64) -> Self {
        Self {
            sessions: DashMap::new(),
            active_by_visitor: DashMap::new(),
            visitors: DashMap::new(),
            journeys: Mutex::new(Vec::new()),
            timeout: Duration::minutes(session_timeout_mins),
        }
    }

    /// Registers visitor activity on `page`. Reuses the visitor's session
    /// when it is still live, otherwise ends it and starts a fresh one.
    /// Returns the live session id and the archived journey if a stale
    /// session was closed out.
    pub fn touch(
        &self,
        visitor_id: &str,
        customer_id: Option<&str>,
        page: &str,
        referrer: Option<&str>,
        device: DeviceInfo,
        now: DateTime<Utc>,
    ) -> (Uuid, Option<ArchivedJourney>) {
        let mut archived = None;

        if let Some(session_id) = self.active_by_visitor.get(visitor_id).map(|r| *r) {
            if let Some(mut session) = self.sessions.get_mut(&session_id) {
                if now - session.last_activity <= self.timeout {
                    session.last_activity = now;
                    session.pages.push(page.to_string());
                    if session.customer_id.is_none() {
                        session.customer_id = customer_id.map(str::to_string);
                    }
                    self.record_page_view(visitor_id, now);
                    return (session_id, None);
                }
            }
            // Stale: close it out before starting a new one.
            archived = self.end_session(session_id);
        }

        let session_id = Uuid::new_v4();
        let session = Session {
            id: session_id,
            visitor_id: visitor_id.to_string(),
            customer_id: customer_id.map(str::to_string),
            start_time: now,
            last_activity: now,
            pages: vec![page.to_string()],
            events: Vec::new(),
            entry_page: page.to_string(),
            referrer: referrer.map(str::to_string),
            device,
        };
        self.sessions.insert(session_id, session);
        self.active_by_visitor
            .insert(visitor_id.to_string(), session_id);
        self.upsert_visitor(visitor_id, now);

        debug!(%session_id, visitor_id, page, "Session started");
        (session_id, archived)
    }

    /// Appends an event to the session's ordered event list and bumps
    /// `last_activity`. Returns false if the session is unknown.
    pub fn append_event(&self, session_id: Uuid, event: BehaviorEvent) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(mut session) => {
                session.last_activity = event.timestamp;
                if session.customer_id.is_none() {
                    session.customer_id = event.customer_id.clone();
                }
                session.events.push(event);
                true
            }
            None => false,
        }
    }

    /// Ends the session and archives it as a journey. Single-page sessions
    /// are flagged as bounces.
    pub fn end_session(&self, session_id: Uuid) -> Option<ArchivedJourney> {
        let (_, session) = self.sessions.remove(&session_id)?;
        self.active_by_visitor.remove(&session.visitor_id);

        let exit_page = session
            .pages
            .last()
            .cloned()
            .unwrap_or_else(|| session.entry_page.clone());
        let journey = ArchivedJourney {
            session_id: session.id,
            visitor_id: session.visitor_id.clone(),
            customer_id: session.customer_id.clone(),
            entry_page: session.entry_page.clone(),
            exit_page,
            page_count: session.pages.len(),
            event_count: session.events.len(),
            duration_secs: (session.last_activity - session.start_time).num_seconds(),
            bounced: session.pages.len() <= 1,
            started_at: session.start_time,
            ended_at: session.last_activity,
        };

        debug!(
            %session_id,
            visitor_id = %journey.visitor_id,
            bounced = journey.bounced,
            "Session ended"
        );

        self.journeys.lock().push(journey.clone());
        Some(journey)
    }

    /// Ends every session idle past the timeout. Returns the archived
    /// journeys, bounces included.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> Vec<ArchivedJourney> {
        let stale: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|r| now - r.last_activity > self.timeout)
            .map(|r| r.id)
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.end_session(id))
            .collect()
    }

    pub fn get_session(&self, session_id: Uuid) -> Option<Session> {
        self.sessions.get(&session_id).map(|r| r.clone())
    }

    pub fn active_sessions(&self) -> Vec<Session> {
        self.sessions.iter().map(|r| r.clone()).collect()
    }

    pub fn visitor(&self, visitor_id: &str) -> Option<VisitorProfile> {
        self.visitors.get(visitor_id).map(|r| r.clone())
    }

    pub fn visitor_count(&self) -> usize {
        self.visitors.len()
    }

    pub fn journeys(&self) -> Vec<ArchivedJourney> {
        self.journeys.lock().clone()
    }

    fn upsert_visitor(&self, visitor_id: &str, now: DateTime<Utc>) {
        self.visitors
            .entry(visitor_id.to_string())
            .and_modify(|v| {
                v.last_seen = now;
                v.session_count += 1;
                v.total_page_views += 1;
            })
            .or_insert_with(|| VisitorProfile {
                visitor_id: visitor_id.to_string(),
                first_seen: now,
                last_seen: now,
                session_count: 1,
                total_page_views: 1,
            });
    }

    fn record_page_view(&self, visitor_id: &str, now: DateTime<Utc>) {
        if let Some(mut v) = self.visitors.get_mut(visitor_id) {
            v.last_seen = now;
            v.total_page_views += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(30)
    }

    #[test]
    fn test_session_reused_within_timeout() {
        let store = store();
        let now = Utc::now();
        let (first, _) = store.touch("v1", None, "/home", None, DeviceInfo::default(), now);
        let (second, archived) = store.touch(
            "v1",
            None,
            "/products",
            None,
            DeviceInfo::default(),
            now + Duration::minutes(10),
        );

        assert_eq!(first, second);
        assert!(archived.is_none());
        let session = store.get_session(first).unwrap();
        assert_eq!(session.pages, vec!["/home", "/products"]);
    }

    #[test]
    fn test_stale_session_replaced_and_archived() {
        let store = store();
        let now = Utc::now();
        let (first, _) = store.touch("v1", None, "/home", None, DeviceInfo::default(), now);
        let (second, archived) = store.touch(
            "v1",
            None,
            "/sale",
            None,
            DeviceInfo::default(),
            now + Duration::minutes(45),
        );

        assert_ne!(first, second);
        let journey = archived.unwrap();
        assert!(journey.bounced);
        assert_eq!(journey.entry_page, "/home");
        assert_eq!(journey.exit_page, "/home");
    }

    #[test]
    fn test_multi_page_session_not_bounced() {
        let store = store();
        let now = Utc::now();
        let (id, _) = store.touch("v1", None, "/home", None, DeviceInfo::default(), now);
        store.touch(
            "v1",
            None,
            "/cart",
            None,
            DeviceInfo::default(),
            now + Duration::minutes(1),
        );

        let journey = store.end_session(id).unwrap();
        assert!(!journey.bounced);
        assert_eq!(journey.page_count, 2);
        assert_eq!(journey.exit_page, "/cart");
    }

    #[test]
    fn test_visitor_profile_upserted() {
        let store = store();
        let now = Utc::now();
        store.touch("v1", None, "/a", None, DeviceInfo::default(), now);
        store.touch(
            "v1",
            None,
            "/b",
            None,
            DeviceInfo::default(),
            now + Duration::hours(2),
        );

        let visitor = store.visitor("v1").unwrap();
        assert_eq!(visitor.session_count, 2);
        assert_eq!(visitor.total_page_views, 2);
    }

    #[test]
    fn test_expire_idle() {
        let store = store();
        let now = Utc::now();
        store.touch("v1", None, "/a", None, DeviceInfo::default(), now);
        store.touch("v2", None, "/b", None, DeviceInfo::default(), now);

        let expired = store.expire_idle(now + Duration::minutes(31));
        assert_eq!(expired.len(), 2);
        assert!(store.active_sessions().is_empty());
    }
}
