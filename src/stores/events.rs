use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::apply_patch;
use crate::storage::{self, Persisted, StorageError, Store};
use crate::types::{Event, EventPatch, EventStatus, EventType, NewEvent};

use super::{new_id, required};

pub const DEFAULT_WINDOW_DAYS: u64 = 7;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventState {
    pub events: Vec<Event>,
}

impl Persisted for EventState {
    const KEY: &'static str = "event-store";

    fn seed() -> Self {
        let today = Utc::now().date_naive();
        let day = |n| today.checked_add_days(Days::new(n)).unwrap_or(today);
        EventState {
            events: vec![
                Event {
                    id: "1".to_string(),
                    title: "Mesyuarat Jabatan".to_string(),
                    description: Some("Kajian semula kemajuan jabatan bulanan".to_string()),
                    date: day(1),
                    start_time: NaiveTime::from_hms_opt(9, 0, 0),
                    end_time: None,
                    location: Some("Bilik Mesyuarat A".to_string()),
                    organizer: None,
                    event_type: EventType::Meeting,
                    status: EventStatus::Scheduled,
                    staff_in_charge: None,
                },
                Event {
                    id: "2".to_string(),
                    title: "Latihan ICT".to_string(),
                    description: Some("Sesi latihan sistem baharu".to_string()),
                    date: day(2),
                    start_time: NaiveTime::from_hms_opt(14, 0, 0),
                    end_time: None,
                    location: Some("Bilik Latihan".to_string()),
                    organizer: None,
                    event_type: EventType::Training,
                    status: EventStatus::Scheduled,
                    staff_in_charge: None,
                },
            ],
        }
    }
}

/// Instant an event starts on the display's wall clock; untimed events
/// start at midnight.
pub fn starts_at(event: &Event, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let time = event.start_time.unwrap_or(NaiveTime::MIN);
    offset
        .from_local_datetime(&event.date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `days` as a span, or `None` when it is too large to represent.
fn window(days: u64) -> Option<TimeDelta> {
    i64::try_from(days).ok().and_then(TimeDelta::try_days)
}

impl Store<EventState> {
    pub fn list_events(&self) -> &[Event] {
        &self.state().events
    }

    pub fn add_event(&mut self, input: NewEvent) -> Result<Event, String> {
        let title = required(&input.title, "title")?;
        if let (Some(start), Some(end)) = (input.start_time, input.end_time) {
            if end < start {
                return Err("endTime must not be before startTime".to_string());
            }
        }
        let event = Event {
            id: new_id(),
            title,
            description: input.description,
            date: input.date,
            start_time: input.start_time,
            end_time: input.end_time,
            location: input.location,
            organizer: input.organizer,
            event_type: input.event_type,
            status: input.status,
            staff_in_charge: input.staff_in_charge,
        };
        self.state_mut().events.push(event.clone());
        Ok(event)
    }

    pub fn update_event(&mut self, id: &str, patch: EventPatch) -> Result<Event, StorageError> {
        storage::modify(&mut self.state_mut().events, id, "Event", |event| {
            apply_patch!(event, patch; title, date, event_type, status;
                optional: description, start_time, end_time, location, organizer, staff_in_charge);
        })
    }

    pub fn delete_event(&mut self, id: &str) -> Result<Event, StorageError> {
        storage::remove(&mut self.state_mut().events, id, "Event")
    }

    pub fn events_on(&self, date: NaiveDate) -> Vec<Event> {
        self.state()
            .events
            .iter()
            .filter(|e| e.date == date)
            .cloned()
            .collect()
    }

    /// Events starting after `now` and before `now + days`, soonest first.
    pub fn upcoming_events(&self, now: DateTime<Utc>, days: u64, offset: &FixedOffset) -> Vec<Event> {
        let horizon = window(days)
            .and_then(|span| now.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut found: Vec<(DateTime<Utc>, Event)> = self
            .state()
            .events
            .iter()
            .filter_map(|e| starts_at(e, offset).map(|at| (at, e)))
            .filter(|(at, _)| *at > now && *at < horizon)
            .map(|(at, e)| (at, e.clone()))
            .collect();
        found.sort_by_key(|(at, _)| *at);
        found.into_iter().map(|(_, e)| e).collect()
    }

    /// Events that started within the last `days`, most recent first.
    pub fn past_events(&self, now: DateTime<Utc>, days: u64, offset: &FixedOffset) -> Vec<Event> {
        let floor = window(days)
            .and_then(|span| now.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut found: Vec<(DateTime<Utc>, Event)> = self
            .state()
            .events
            .iter()
            .filter_map(|e| starts_at(e, offset).map(|at| (at, e)))
            .filter(|(at, _)| *at < now && *at > floor)
            .map(|(at, e)| (at, e.clone()))
            .collect();
        found.sort_by(|a, b| b.0.cmp(&a.0));
        found.into_iter().map(|(_, e)| e).collect()
    }

    pub fn events_by_type(&self, event_type: EventType) -> Vec<Event> {
        self.state()
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}
