use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::apply_patch;
use crate::storage::{self, Persisted, StorageError, Store};
use crate::types::{Announcement, AnnouncementPatch, NewAnnouncement, Priority};

use super::{new_id, required};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnouncementState {
    pub announcements: Vec<Announcement>,
}

impl Persisted for AnnouncementState {
    const KEY: &'static str = "announcement-storage";

    fn seed() -> Self {
        Self::default()
    }
}

impl Store<AnnouncementState> {
    /// Newest first.
    pub fn list_announcements(&self) -> &[Announcement] {
        &self.state().announcements
    }

    pub fn announcements_by_priority(&self, priority: Priority) -> Vec<Announcement> {
        self.state()
            .announcements
            .iter()
            .filter(|a| a.priority == priority)
            .cloned()
            .collect()
    }

    pub fn add_announcement(&mut self, input: NewAnnouncement) -> Result<Announcement, String> {
        let content = required(&input.content, "content")?;
        let now = Utc::now();
        let announcement = Announcement {
            id: new_id(),
            content,
            author: input.author.trim().to_string(),
            priority: input.priority,
            created_at: now,
            updated_at: now,
        };
        self.state_mut()
            .announcements
            .insert(0, announcement.clone());
        Ok(announcement)
    }

    pub fn update_announcement(
        &mut self,
        id: &str,
        patch: AnnouncementPatch,
    ) -> Result<Announcement, StorageError> {
        storage::modify(&mut self.state_mut().announcements, id, "Announcement", |a| {
            apply_patch!(a, patch; content, author, priority);
            a.updated_at = Utc::now();
        })
    }

    pub fn delete_announcement(&mut self, id: &str) -> Result<Announcement, StorageError> {
        storage::remove(&mut self.state_mut().announcements, id, "Announcement")
    }
}
