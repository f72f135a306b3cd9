//! The calendar engine: event map, status transitions, conflict checks,
//! and availability search.
//!
//! All mutating operations and set-iterating reads go through a single
//! `parking_lot::RwLock` around the event map, so concurrent negotiations
//! see a serialized view.  Mutations write through to the injected
//! [`EventStore`] when one is configured.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use ca_domain::duration::parse_duration_minutes;
use ca_domain::error::{Error, Result};

use crate::event::{Event, EventStatus};
use crate::store::EventStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A contiguous free interval long enough for a requested duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CalendarEngine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared calendar state for one owner agent.
pub struct CalendarEngine {
    owner_id: String,
    events: RwLock<HashMap<String, Event>>,
    store: Option<Arc<dyn EventStore>>,
}

impl CalendarEngine {
    /// In-memory engine with no persistence (tests, ephemeral runs).
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            events: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Engine backed by a durable store.  Replays `load_all()` so the
    /// in-memory map reflects the persisted event log.
    pub fn with_store(owner_id: impl Into<String>, store: Arc<dyn EventStore>) -> Result<Self> {
        let events: HashMap<String, Event> = store
            .load_all()?
            .into_iter()
            .map(|e| (e.event_id.clone(), e))
            .collect();

        tracing::info!(count = events.len(), "calendar engine loaded from store");

        Ok(Self {
            owner_id: owner_id.into(),
            events: RwLock::new(events),
            store: Some(store),
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    // ── Insertion ──────────────────────────────────────────────────

    /// Construct and insert a proposed event, conflict-checked.
    pub fn propose(
        &self,
        start: DateTime<Utc>,
        duration: &str,
        partner_agent_id: &str,
        title: Option<String>,
    ) -> Result<Event> {
        let event = Event::new(start, duration, partner_agent_id, title)?;
        self.add(event)
    }

    /// Insert an event, failing with [`Error::Conflict`] when it overlaps
    /// any accepted/confirmed/booked event.
    pub fn add(&self, event: Event) -> Result<Event> {
        let mut events = self.events.write();
        if Self::conflicts_locked(&events, &event)? {
            return Err(Error::Conflict(format!(
                "event at {} ({}) overlaps an existing blocking event",
                event.start, event.duration
            )));
        }
        self.persist(&event)?;
        events.insert(event.event_id.clone(), event.clone());
        Ok(event)
    }

    /// Whether an event would conflict with the current blocking set.
    pub fn has_conflict(&self, event: &Event) -> Result<bool> {
        Self::conflicts_locked(&self.events.read(), event)
    }

    fn conflicts_locked(events: &HashMap<String, Event>, candidate: &Event) -> Result<bool> {
        for existing in events.values() {
            if existing.status.blocks_calendar() && candidate.overlaps(existing)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ── Status transitions ─────────────────────────────────────────

    pub fn accept(&self, event_id: &str) -> Result<Option<Event>> {
        self.apply(event_id, EventStatus::Accepted)
    }

    pub fn reject(&self, event_id: &str) -> Result<Option<Event>> {
        self.apply(event_id, EventStatus::Rejected)
    }

    pub fn confirm(&self, event_id: &str) -> Result<Option<Event>> {
        self.apply(event_id, EventStatus::Confirmed)
    }

    pub fn mark_booked(&self, event_id: &str) -> Result<Option<Event>> {
        self.apply(event_id, EventStatus::Booked)
    }

    pub fn mark_failed(&self, event_id: &str) -> Result<Option<Event>> {
        self.apply(event_id, EventStatus::Failed)
    }

    pub fn mark_no_show(&self, event_id: &str) -> Result<Option<Event>> {
        self.apply(event_id, EventStatus::NoShow)
    }

    /// Apply a transition.  `Ok(None)` when the id is unknown or the
    /// transition is not legal from the current status; the store is only
    /// touched when something actually changed, and a failed store write
    /// leaves the in-memory event untouched.
    fn apply(&self, event_id: &str, next: EventStatus) -> Result<Option<Event>> {
        let mut events = self.events.write();
        let Some(event) = events.get_mut(event_id) else {
            return Ok(None);
        };
        let mut updated = event.clone();
        if !updated.transition(next) {
            return Ok(None);
        }
        self.persist(&updated)?;
        *event = updated.clone();
        Ok(Some(updated))
    }

    /// Remove an event outright.  Returns whether it existed.
    pub fn remove(&self, event_id: &str) -> Result<bool> {
        let existed = self.events.write().remove(event_id).is_some();
        if existed {
            if let Some(store) = &self.store {
                store.delete(event_id)?;
            }
        }
        Ok(existed)
    }

    /// Drop every event (store included).
    pub fn clear(&self) -> Result<()> {
        let ids: Vec<String> = {
            let mut events = self.events.write();
            let ids = events.keys().cloned().collect();
            events.clear();
            ids
        };
        if let Some(store) = &self.store {
            for id in &ids {
                store.delete(id)?;
            }
        }
        Ok(())
    }

    fn persist(&self, event: &Event) -> Result<()> {
        if let Some(store) = &self.store {
            store.save(event)?;
        }
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn get(&self, event_id: &str) -> Option<Event> {
        self.events.read().get(event_id).cloned()
    }

    pub fn by_status(&self, status: EventStatus) -> Vec<Event> {
        self.events
            .read()
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect()
    }

    pub fn by_partner(&self, partner_agent_id: &str) -> Vec<Event> {
        self.events
            .read()
            .values()
            .filter(|e| e.partner_agent_id == partner_agent_id)
            .cloned()
            .collect()
    }

    /// Proposed ∪ accepted: requests still in negotiation.
    pub fn pending(&self) -> Vec<Event> {
        self.events
            .read()
            .values()
            .filter(|e| matches!(e.status, EventStatus::Proposed | EventStatus::Accepted))
            .cloned()
            .collect()
    }

    /// Confirmed ∪ booked.
    pub fn confirmed(&self) -> Vec<Event> {
        self.events
            .read()
            .values()
            .filter(|e| matches!(e.status, EventStatus::Confirmed | EventStatus::Booked))
            .cloned()
            .collect()
    }

    /// Future accepted/confirmed/booked events, ascending by start,
    /// optionally truncated.
    pub fn upcoming(&self, limit: Option<usize>) -> Vec<Event> {
        let now = Utc::now();
        let mut upcoming: Vec<Event> = self
            .events
            .read()
            .values()
            .filter(|e| e.start > now && e.status.blocks_calendar())
            .cloned()
            .collect();
        upcoming.sort_by_key(|e| e.start);
        if let Some(limit) = limit {
            upcoming.truncate(limit);
        }
        upcoming
    }

    pub fn all(&self) -> Vec<Event> {
        self.events.read().values().cloned().collect()
    }

    pub fn count_by_status(&self) -> HashMap<EventStatus, usize> {
        let mut counts = HashMap::new();
        for event in self.events.read().values() {
            *counts.entry(event.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    // ── Availability search ────────────────────────────────────────

    /// Enumerate free slots of `duration` inside `[window_start, window_end]`,
    /// keeping `buffer_minutes` of separation from every blocking event.
    ///
    /// Within each gap between blocking events, candidate slots are laid
    /// out back-to-back at `duration + buffer` spacing; after the final
    /// blocking event the walk continues to the window end.  A slot is
    /// only emitted when `start + duration` fits inside the window.
    pub fn available_slots(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        duration: &str,
        buffer_minutes: u32,
    ) -> Result<Vec<Slot>> {
        let duration_minutes = parse_duration_minutes(duration)?;
        let slot_len = Duration::minutes(i64::from(duration_minutes));
        let stride = Duration::minutes(i64::from(duration_minutes + buffer_minutes));
        let buffer = Duration::minutes(i64::from(buffer_minutes));

        // Snapshot the blocking events intersecting the window, start-ordered.
        let mut blocking: Vec<(DateTime<Utc>, DateTime<Utc>)> = Vec::new();
        for event in self.events.read().values() {
            if !event.status.blocks_calendar() {
                continue;
            }
            let end = event.end()?;
            if event.start < window_end && end > window_start {
                blocking.push((event.start, end));
            }
        }
        blocking.sort_by_key(|(start, _)| *start);

        let mut slots = Vec::new();
        let mut cursor = window_start;

        for (event_start, event_end) in blocking {
            if event_start - cursor >= stride {
                let mut slot_start = cursor;
                while slot_start + stride <= event_start {
                    let slot_end = slot_start + slot_len;
                    if slot_end <= window_end {
                        slots.push(Slot {
                            start: slot_start,
                            end: slot_end,
                            duration_minutes,
                        });
                    }
                    slot_start += stride;
                }
            }
            cursor = cursor.max(event_end + buffer);
        }

        // Tail of the window after the last blocking event.
        if cursor < window_end {
            let mut slot_start = cursor;
            while slot_start + slot_len <= window_end {
                slots.push(Slot {
                    start: slot_start,
                    end: slot_start + slot_len,
                    duration_minutes,
                });
                slot_start += stride;
            }
        }

        Ok(slots)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        // A Monday.
        Utc.with_ymd_and_hms(2025, 6, 2, hour, min, 0).unwrap()
    }

    fn engine() -> CalendarEngine {
        CalendarEngine::new("owner-1")
    }

    #[test]
    fn propose_then_get() {
        let cal = engine();
        let e = cal.propose(at(10, 0), "30m", "agent-beta", None).unwrap();
        assert_eq!(cal.get(&e.event_id).unwrap().partner_agent_id, "agent-beta");
        assert_eq!(cal.len(), 1);
    }

    #[test]
    fn proposed_events_do_not_conflict() {
        let cal = engine();
        cal.propose(at(10, 0), "30m", "a", None).unwrap();
        // Overlapping proposal is fine — only blocking statuses conflict.
        cal.propose(at(10, 15), "30m", "b", None).unwrap();
        assert_eq!(cal.len(), 2);
    }

    #[test]
    fn accepted_event_blocks_overlapping_proposal() {
        let cal = engine();
        let e = cal.propose(at(10, 0), "30m", "a", None).unwrap();
        cal.accept(&e.event_id).unwrap().unwrap();

        let err = cal.propose(at(10, 15), "30m", "b", None).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(cal.len(), 1, "calendar size unchanged on conflict");
    }

    #[test]
    fn back_to_back_insert_is_allowed() {
        let cal = engine();
        let e = cal.propose(at(10, 0), "30m", "a", None).unwrap();
        cal.accept(&e.event_id).unwrap().unwrap();
        cal.propose(at(10, 30), "30m", "b", None).unwrap();
    }

    #[test]
    fn transition_chain_propose_accept_confirm_book() {
        let cal = engine();
        let e = cal.propose(at(9, 0), "1h", "a", None).unwrap();

        let e = cal.accept(&e.event_id).unwrap().unwrap();
        assert_eq!(e.status, EventStatus::Accepted);
        let e = cal.confirm(&e.event_id).unwrap().unwrap();
        assert_eq!(e.status, EventStatus::Confirmed);
        let e = cal.mark_booked(&e.event_id).unwrap().unwrap();
        assert_eq!(e.status, EventStatus::Booked);
    }

    #[test]
    fn repeated_accept_is_noop() {
        let cal = engine();
        let e = cal.propose(at(9, 0), "30m", "a", None).unwrap();
        assert!(cal.accept(&e.event_id).unwrap().is_some());
        assert!(cal.accept(&e.event_id).unwrap().is_none());
        assert_eq!(cal.get(&e.event_id).unwrap().status, EventStatus::Accepted);
    }

    #[test]
    fn transition_on_unknown_id_is_none() {
        let cal = engine();
        assert!(cal.accept("evt-missing").unwrap().is_none());
        assert!(cal.mark_failed("evt-missing").unwrap().is_none());
    }

    #[test]
    fn reject_only_from_proposed() {
        let cal = engine();
        let e = cal.propose(at(9, 0), "30m", "a", None).unwrap();
        cal.accept(&e.event_id).unwrap();
        assert!(cal.reject(&e.event_id).unwrap().is_none());
    }

    #[test]
    fn remove_add_round_trip() {
        let cal = engine();
        let before: Vec<String> = cal.all().iter().map(|e| e.event_id.clone()).collect();
        let e = cal.propose(at(9, 0), "30m", "a", None).unwrap();
        assert!(cal.remove(&e.event_id).unwrap());
        let after: Vec<String> = cal.all().iter().map(|e| e.event_id.clone()).collect();
        assert_eq!(before, after);
        assert!(!cal.remove(&e.event_id).unwrap());
    }

    #[test]
    fn pending_and_confirmed_views() {
        let cal = engine();
        let p = cal.propose(at(9, 0), "30m", "a", None).unwrap();
        let a = cal.propose(at(11, 0), "30m", "a", None).unwrap();
        cal.accept(&a.event_id).unwrap();
        let c = cal.propose(at(13, 0), "30m", "a", None).unwrap();
        cal.confirm(&c.event_id).unwrap();
        let b = cal.propose(at(15, 0), "30m", "a", None).unwrap();
        cal.mark_booked(&b.event_id).unwrap();

        let pending: Vec<String> = cal.pending().iter().map(|e| e.event_id.clone()).collect();
        assert!(pending.contains(&p.event_id) && pending.contains(&a.event_id));
        assert_eq!(pending.len(), 2);

        let confirmed: Vec<String> = cal.confirmed().iter().map(|e| e.event_id.clone()).collect();
        assert!(confirmed.contains(&c.event_id) && confirmed.contains(&b.event_id));
        assert_eq!(confirmed.len(), 2);
    }

    #[test]
    fn upcoming_sorted_and_truncated() {
        let cal = engine();
        let future = Utc::now() + Duration::days(7);
        let mk = |offset_min: i64| {
            let e = cal
                .propose(future + Duration::minutes(offset_min * 100), "30m", "a", None)
                .unwrap();
            cal.accept(&e.event_id).unwrap().unwrap()
        };
        let later = mk(2);
        let soonest = mk(0);
        let mid = mk(1);

        // A past event never shows up even when booked.
        let past = Event::new(Utc::now() - Duration::days(1), "30m", "a", None).unwrap();
        let past = cal.add(past).unwrap();
        cal.mark_booked(&past.event_id).unwrap();

        let upcoming = cal.upcoming(None);
        let ids: Vec<&str> = upcoming.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                soonest.event_id.as_str(),
                mid.event_id.as_str(),
                later.event_id.as_str()
            ]
        );

        assert_eq!(cal.upcoming(Some(2)).len(), 2);
    }

    #[test]
    fn count_by_status_counts() {
        let cal = engine();
        cal.propose(at(9, 0), "30m", "a", None).unwrap();
        cal.propose(at(17, 0), "30m", "a", None).unwrap();
        let e = cal.propose(at(11, 0), "30m", "a", None).unwrap();
        cal.accept(&e.event_id).unwrap();

        let counts = cal.count_by_status();
        assert_eq!(counts[&EventStatus::Proposed], 2);
        assert_eq!(counts[&EventStatus::Accepted], 1);
        assert!(!counts.contains_key(&EventStatus::Booked));
    }

    // ── Availability search ────────────────────────────────────────

    #[test]
    fn slots_on_empty_calendar() {
        let cal = engine();
        let slots = cal
            .available_slots(at(9, 0), at(12, 0), "30m", 15)
            .unwrap();
        let starts: Vec<DateTime<Utc>> = slots.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![at(9, 0), at(9, 45), at(10, 30), at(11, 15)]);
        for s in &slots {
            assert_eq!(s.duration_minutes, 30);
            assert_eq!(s.end, s.start + Duration::minutes(30));
        }
    }

    #[test]
    fn slots_skip_blocking_event_with_buffer() {
        let cal = engine();
        let e = cal.propose(at(10, 0), "1h", "a", None).unwrap();
        cal.confirm(&e.event_id).unwrap();

        let slots = cal
            .available_slots(at(9, 0), at(13, 0), "30m", 15)
            .unwrap();
        for slot in &slots {
            // No slot may touch 10:00–11:00 or its 15m buffer tail.
            assert!(
                slot.end <= at(10, 0) || slot.start >= at(11, 15),
                "slot {:?} violates the blocked interval",
                slot
            );
        }
        assert!(slots.iter().any(|s| s.start == at(9, 0)));
        assert!(slots.iter().any(|s| s.start >= at(11, 15)));
    }

    #[test]
    fn slots_ignore_non_blocking_events() {
        let cal = engine();
        cal.propose(at(10, 0), "3h", "a", None).unwrap(); // proposed only
        let slots = cal
            .available_slots(at(9, 0), at(12, 0), "30m", 15)
            .unwrap();
        assert_eq!(slots.len(), 4);
    }

    #[test]
    fn slot_never_exceeds_window_end() {
        let cal = engine();
        let slots = cal.available_slots(at(9, 0), at(9, 50), "30m", 15).unwrap();
        // 09:00 fits (ends 09:30); 09:45 would end 10:15 — excluded.
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start, at(9, 0));
    }

    #[test]
    fn slots_reject_bad_duration() {
        let cal = engine();
        assert!(cal.available_slots(at(9, 0), at(12, 0), "later", 15).is_err());
    }

    #[test]
    fn blocking_pair_never_overlaps_invariant() {
        // Universal invariant: no two blocking events in a calendar overlap.
        let cal = engine();
        for hour in [9u32, 10, 11, 13] {
            if let Ok(e) = cal.propose(at(hour, 0), "1h", "a", None) {
                cal.accept(&e.event_id).unwrap();
            }
        }
        // 10:30 overlaps the accepted 10:00–11:00 event.
        let overlap = Event::new(at(10, 30), "30m", "b", None).unwrap();
        assert!(cal.add(overlap).is_err());

        let blocking: Vec<Event> = cal
            .all()
            .into_iter()
            .filter(|e| e.status.blocks_calendar())
            .collect();
        for (i, a) in blocking.iter().enumerate() {
            for b in blocking.iter().skip(i + 1) {
                assert!(!a.overlaps(b).unwrap());
            }
        }
    }

    #[test]
    fn clear_empties_engine() {
        let cal = engine();
        cal.propose(at(9, 0), "30m", "a", None).unwrap();
        cal.clear().unwrap();
        assert!(cal.is_empty());
    }
}
