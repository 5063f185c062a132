//! Calendar event model.
//!
//! The event collection is the plaintext payload of every envelope. Its JSON
//! form is an array of objects with `id`, `title`, `date`, and optionally
//! `time` and `description`, matching what the browser client writes.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Error, Result};

/// Opaque unique identifier of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Wrap an existing identifier.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidInput("EventId cannot be empty".to_string()));
        }
        Ok(Self(id))
    }

    /// Generate a fresh identifier.
    ///
    /// UUIDv7 embeds the creation timestamp, so ids sort by creation time and
    /// are never reused even when two events are created in the same
    /// millisecond.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    /// Calendar date, `YYYY-MM-DD` on the wire.
    pub date: NaiveDate,
    /// Optional clock time, `HH:MM` on the wire.
    #[serde(
        default,
        with = "clock_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub time: Option<NaiveTime>,
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

/// Event fields supplied by the user before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub description: Option<String>,
}

impl NewEvent {
    /// Create an untimed event with no description.
    pub fn new(title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            date,
            time: None,
            description: None,
        }
    }

    /// Set the clock time.
    pub fn with_time(mut self, time: NaiveTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the description. Blank descriptions are dropped.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.is_empty()).then_some(description);
        self
    }
}

/// The full set of events owned by one user.
///
/// Order is insertion order and carries no meaning; display ordering is
/// computed by [`EventCollection::upcoming`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCollection {
    events: Vec<Event>,
}

impl EventCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from existing events.
    ///
    /// # Errors
    /// - Returns error if two events share an id
    pub fn from_events(events: Vec<Event>) -> Result<Self> {
        let mut collection = Self::new();
        for event in events {
            collection.insert(event)?;
        }
        Ok(collection)
    }

    /// Add a new event, assigning it a fresh id.
    ///
    /// # Errors
    /// - Returns error if the title is blank
    pub fn add(&mut self, new: NewEvent) -> Result<EventId> {
        if new.title.trim().is_empty() {
            return Err(Error::InvalidInput("Event title cannot be empty".to_string()));
        }

        let id = EventId::generate();
        self.events.push(Event {
            id: id.clone(),
            title: new.title,
            date: new.date,
            time: new.time,
            description: new.description,
        });
        Ok(id)
    }

    /// Insert an event that already has an id.
    ///
    /// # Errors
    /// - Returns error if an event with the same id exists
    pub fn insert(&mut self, event: Event) -> Result<()> {
        if self.get(&event.id).is_some() {
            return Err(Error::InvalidInput(format!(
                "Duplicate event id: {}",
                event.id
            )));
        }
        self.events.push(event);
        Ok(())
    }

    /// Remove an event by id. Returns whether anything was removed.
    pub fn remove(&mut self, id: &EventId) -> bool {
        let before = self.events.len();
        self.events.retain(|e| &e.id != id);
        self.events.len() != before
    }

    /// Look up an event by id.
    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.events.iter().find(|e| &e.id == id)
    }

    /// Events falling on the given date, in insertion order.
    pub fn on_date(&self, date: NaiveDate) -> Vec<&Event> {
        self.events.iter().filter(|e| e.date == date).collect()
    }

    /// Events on or after `today`, sorted by date and then time.
    ///
    /// Untimed events sort before timed events on the same day.
    pub fn upcoming(&self, today: NaiveDate) -> Vec<&Event> {
        let mut upcoming: Vec<&Event> = self.events.iter().filter(|e| e.date >= today).collect();
        upcoming.sort_by(|a, b| a.date.cmp(&b.date).then(a.time.cmp(&b.time)));
        upcoming
    }

    /// Iterate over events in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialize to the plaintext byte form that gets encrypted.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse the plaintext byte form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let events: Vec<Event> =
            serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        Self::from_events(events)
    }
}

impl<'a> IntoIterator for &'a EventCollection {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// `HH:MM` clock time, with `""` read as absent.
mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serializer.serialize_str(&t.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(s) => NaiveTime::parse_from_str(s, FORMAT)
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
