use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::apply_patch;
use crate::storage::{self, Persisted, StorageError, Store};
use crate::types::{Countdown, CountdownPatch, NewCountdown};

use super::new_id;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CountdownState {
    pub countdowns: Vec<Countdown>,
}

impl Persisted for CountdownState {
    const KEY: &'static str = "countdowns";

    fn seed() -> Self {
        Self::default()
    }
}

/// A countdown stays listed while its target is ahead or it is flagged active.
pub fn is_listed(countdown: &Countdown, now: DateTime<Utc>) -> bool {
    countdown.target_date > now || countdown.is_active
}

impl Store<CountdownState> {
    /// Date-only targets count from midnight at `offset`. A missing title or
    /// an unreadable target both count as missing fields.
    pub fn create_countdown(
        &mut self,
        input: NewCountdown,
        now: DateTime<Utc>,
        offset: &FixedOffset,
    ) -> Result<Countdown, String> {
        let title = input
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let target_date = input.target_date.and_then(|t| t.resolve(offset));
        let (Some(title), Some(target_date)) = (title, target_date) else {
            return Err("Missing required fields".to_string());
        };
        if target_date <= now {
            return Err("Target date must be in the future".to_string());
        }
        let countdown = Countdown {
            id: new_id(),
            title: title.to_string(),
            description: input.description.unwrap_or_default(),
            target_date,
            created_at: now,
            is_active: true,
        };
        self.state_mut().countdowns.push(countdown.clone());
        Ok(countdown)
    }

    /// Listed countdowns; expired inactive ones are dropped from the store.
    /// Returns the list and whether anything was pruned.
    pub fn active_countdowns(&mut self, now: DateTime<Utc>) -> (Vec<Countdown>, bool) {
        let countdowns = &mut self.state_mut().countdowns;
        let before = countdowns.len();
        countdowns.retain(|c| is_listed(c, now));
        (countdowns.clone(), countdowns.len() != before)
    }

    /// An unreadable target in `patch` leaves the current one in place.
    pub fn update_countdown(
        &mut self,
        id: &str,
        patch: CountdownPatch,
        offset: &FixedOffset,
    ) -> Result<Countdown, StorageError> {
        let target_date = patch.target_date.and_then(|t| t.resolve(offset));
        storage::modify(&mut self.state_mut().countdowns, id, "Countdown", |c| {
            apply_patch!(c, patch; title, description, is_active);
            if let Some(target) = target_date {
                c.target_date = target;
            }
        })
    }

    pub fn delete_countdown(&mut self, id: &str) -> Result<Countdown, StorageError> {
        storage::remove(&mut self.state_mut().countdowns, id, "Countdown")
    }
}
