use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::apply_patch;
use crate::storage::{self, Persisted, StorageError, Store};
use crate::types::{NewStaffMember, StaffData, StaffMember, StaffPatch, StaffStatus};

use super::{new_id, required};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffState {
    pub staff_list: Vec<StaffMember>,
}

impl Persisted for StaffState {
    const KEY: &'static str = "staff-storage";

    fn seed() -> Self {
        let now = Utc::now();
        let member = |id: &str, name: &str, position: &str, status, email: &str| StaffMember {
            id: id.to_string(),
            name: name.to_string(),
            position: position.to_string(),
            department: "ICT".to_string(),
            status,
            email: email.to_string(),
            last_updated: now,
        };
        StaffState {
            staff_list: vec![
                member("1", "HAFIZAL", "F3", StaffStatus::Busy, "hafizal@example.com"),
                member("2", "HAZIM", "F1", StaffStatus::Available, "hazim@example.com"),
                member("3", "HAFSAH", "F3", StaffStatus::Available, "hafsah@example.com"),
                member("4", "ICT PPDJB", "F1", StaffStatus::Available, "ictppdjb@moe.gov.my"),
            ],
        }
    }
}

impl Store<StaffState> {
    pub fn list_staff(&self) -> &[StaffMember] {
        &self.state().staff_list
    }

    pub fn get_staff(&self, id: &str) -> Option<StaffMember> {
        storage::find(&self.state().staff_list, id).cloned()
    }

    pub fn add_staff(&mut self, input: NewStaffMember) -> Result<StaffMember, String> {
        let member = StaffMember {
            id: new_id(),
            name: required(&input.name, "name")?,
            position: input.position,
            department: input.department,
            status: input.status,
            email: input.email,
            last_updated: Utc::now(),
        };
        self.state_mut().staff_list.push(member.clone());
        Ok(member)
    }

    pub fn update_staff(&mut self, id: &str, patch: StaffPatch) -> Result<StaffMember, StorageError> {
        storage::modify(&mut self.state_mut().staff_list, id, "Staff member", |member| {
            apply_patch!(member, patch; name, position, department, status, email);
            member.last_updated = Utc::now();
        })
    }

    pub fn update_staff_status(
        &mut self,
        id: &str,
        status: StaffStatus,
    ) -> Result<StaffMember, StorageError> {
        storage::modify(&mut self.state_mut().staff_list, id, "Staff member", |member| {
            member.status = status;
            member.last_updated = Utc::now();
        })
    }

    pub fn delete_staff(&mut self, id: &str) -> Result<StaffMember, StorageError> {
        storage::remove(&mut self.state_mut().staff_list, id, "Staff member")
    }

    /// Case-insensitive match over name, position, department and email.
    pub fn search_staff(&self, query: &str) -> Vec<StaffMember> {
        let needle = query.trim().to_lowercase();
        self.state()
            .staff_list
            .iter()
            .filter(|s| {
                [&s.name, &s.position, &s.department, &s.email]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    /// Replace the whole list with the latest roster. Members whose email
    /// matches an existing entry keep their id; later rows for the same
    /// email win.
    pub fn replace_from_roster(&mut self, rows: &[StaffData]) -> usize {
        let previous = std::mem::take(&mut self.state_mut().staff_list);
        let mut next: Vec<StaffMember> = Vec::with_capacity(rows.len());

        for row in rows {
            let status = row.status.parse().unwrap_or_else(|_| {
                tracing::debug!(status = %row.status, name = %row.name, "unknown roster status");
                StaffStatus::Offline
            });
            let key = row.email.trim().to_lowercase();
            if !key.is_empty() {
                if let Some(existing) = next.iter_mut().find(|m| m.email.to_lowercase() == key) {
                    if row.timestamp >= existing.last_updated {
                        existing.status = status;
                        existing.position = row.position.clone();
                        existing.department = row.department.clone();
                        existing.last_updated = row.timestamp;
                    }
                    continue;
                }
            }
            let id = previous
                .iter()
                .find(|m| !key.is_empty() && m.email.to_lowercase() == key)
                .map(|m| m.id.clone())
                .unwrap_or_else(new_id);
            next.push(StaffMember {
                id,
                name: row.name.clone(),
                position: row.position.clone(),
                department: row.department.clone(),
                status,
                email: row.email.clone(),
                last_updated: row.timestamp,
            });
        }

        let count = next.len();
        self.state_mut().staff_list = next;
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::temp_data_dir;
    use chrono::TimeZone;

    fn store() -> Store<StaffState> {
        Store::open(&temp_data_dir()).unwrap()
    }

    fn new_member(name: &str, email: &str) -> NewStaffMember {
        NewStaffMember {
            name: name.into(),
            position: "F1".into(),
            department: "ICT".into(),
            status: StaffStatus::Available,
            email: email.into(),
        }
    }

    #[test]
    fn seeded_with_roster() {
        let store = store();
        assert_eq!(store.list_staff().len(), 4);
        assert_eq!(store.list_staff()[0].name, "HAFIZAL");
    }

    #[test]
    fn add_then_list_contains_exactly_once() {
        let mut store = store();
        let added = store.add_staff(new_member("AMIN", "amin@example.com")).unwrap();
        let matches = store.list_staff().iter().filter(|s| s.id == added.id).count();
        assert_eq!(matches, 1);
    }

    #[test]
    fn nameless_member_is_rejected() {
        let mut store = store();
        assert!(store.add_staff(new_member("  ", "x@example.com")).is_err());
        assert_eq!(store.list_staff().len(), 4);
    }

    #[test]
    fn update_touches_only_given_fields() {
        let mut store = store();
        let added = store.add_staff(new_member("AMIN", "amin@example.com")).unwrap();
        let updated = store
            .update_staff(
                &added.id,
                StaffPatch {
                    status: Some(StaffStatus::Meeting),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.id, added.id);
        assert_eq!(updated.status, StaffStatus::Meeting);
        assert_eq!(updated.name, "AMIN");
        assert_eq!(updated.email, "amin@example.com");
        assert!(updated.last_updated >= added.last_updated);
    }

    #[test]
    fn delete_removes_from_listing() {
        let mut store = store();
        store.delete_staff("2").unwrap();
        assert!(store.get_staff("2").is_none());
        assert!(matches!(store.delete_staff("2"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn search_is_case_insensitive() {
        let store = store();
        let found = store.search_staff("moe.gov");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "ICT PPDJB");
        assert_eq!(store.search_staff("ict").len(), 4);
    }

    #[test]
    fn roster_replacement_keeps_ids_by_email() {
        let mut store = store();
        let at = |h| Utc.with_ymd_and_hms(2026, 10, 19, h, 0, 0).unwrap();
        let row = |name: &str, status: &str, email: &str, h| StaffData {
            timestamp: at(h),
            name: name.into(),
            position: "F3".into(),
            department: "ICT".into(),
            status: status.into(),
            email: email.into(),
        };
        let count = store.replace_from_roster(&[
            row("HAFIZAL", "Cuti", "hafizal@example.com", 8),
            row("NEW", "available", "new@example.com", 8),
            row("HAFIZAL", "Mesyuarat", "HAFIZAL@example.com", 10),
            row("GHOST", "teleporting", "", 9),
        ]);
        assert_eq!(count, 3);
        let hafizal = store.get_staff("1").unwrap();
        assert_eq!(hafizal.status, StaffStatus::Meeting);
        assert_eq!(hafizal.last_updated, at(10));
        let ghost = store.search_staff("ghost");
        assert_eq!(ghost[0].status, StaffStatus::Offline);
    }
}
