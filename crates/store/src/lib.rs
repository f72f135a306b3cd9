//! Durable event storage for the calendar engine.
//!
//! Persists the event log in `events.json` and the preferences slot in
//! `preferences.json` under the configured state path.  The files are the
//! source of truth across restarts; the engine's in-memory map is rebuilt
//! from them at startup.  Every mutation flushes, so a crash loses at
//! most the operation in flight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use ca_calendar::{BookingPreferences, Event, EventStore};
use ca_domain::error::{Error, Result};

const EVENTS_FILE: &str = "events.json";
const PREFERENCES_FILE: &str = "preferences.json";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JsonFileStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Event store backed by JSON files under a state directory.
pub struct JsonFileStore {
    events_path: PathBuf,
    preferences_path: PathBuf,
    events: RwLock<HashMap<String, Event>>,
}

impl JsonFileStore {
    /// Open (or create) the store at `state_path`.
    pub fn open(state_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_path).map_err(Error::Io)?;

        let events_path = state_path.join(EVENTS_FILE);
        let events: HashMap<String, Event> = if events_path.exists() {
            let raw = std::fs::read_to_string(&events_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(
                    path = %events_path.display(),
                    error = %e,
                    "unreadable events file, starting empty"
                );
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        tracing::info!(
            events = events.len(),
            path = %events_path.display(),
            "event store opened"
        );

        Ok(Self {
            events_path,
            preferences_path: state_path.join(PREFERENCES_FILE),
            events: RwLock::new(events),
        })
    }

    /// Remove every event, on disk included.
    pub fn clear_events(&self) -> Result<()> {
        self.events.write().clear();
        self.flush()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    fn flush(&self) -> Result<()> {
        let events = self.events.read();
        let json = serde_json::to_string_pretty(&*events)
            .map_err(|e| Error::Other(format!("serializing events: {e}")))?;
        std::fs::write(&self.events_path, json).map_err(Error::Io)?;
        Ok(())
    }
}

impl EventStore for JsonFileStore {
    fn save(&self, event: &Event) -> Result<()> {
        self.events
            .write()
            .insert(event.event_id.clone(), event.clone());
        self.flush()
    }

    fn load(&self, event_id: &str) -> Result<Option<Event>> {
        Ok(self.events.read().get(event_id).cloned())
    }

    fn load_all(&self) -> Result<Vec<Event>> {
        Ok(self.events.read().values().cloned().collect())
    }

    fn delete(&self, event_id: &str) -> Result<()> {
        if self.events.write().remove(event_id).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn save_preferences(&self, prefs: &BookingPreferences) -> Result<()> {
        prefs.validate()?;
        let json = serde_json::to_string_pretty(prefs)
            .map_err(|e| Error::Other(format!("serializing preferences: {e}")))?;
        std::fs::write(&self.preferences_path, json).map_err(Error::Io)?;
        Ok(())
    }

    fn load_preferences(&self) -> Result<Option<BookingPreferences>> {
        if !self.preferences_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.preferences_path).map_err(Error::Io)?;
        let prefs: BookingPreferences = serde_json::from_str(&raw)?;
        Ok(Some(prefs))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
