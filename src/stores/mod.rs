//! Persisted dashboard stores. Each store owns one named JSON file and the
//! CRUD operations over its records; no store reads another.

pub mod announcements;
pub mod assets;
pub mod countdowns;
pub mod dashboard;
pub mod documents;
pub mod events;
pub mod staff;

pub use announcements::AnnouncementState;
pub use assets::AssetState;
pub use countdowns::CountdownState;
pub use dashboard::DashboardState;
pub use documents::DocumentState;
pub use events::EventState;
pub use staff::StaffState;

use ulid::Ulid;

pub(crate) fn new_id() -> String {
    Ulid::new().to_string()
}

/// Trimmed, non-empty text or a validation message naming the field.
pub(crate) fn required(value: &str, field: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(trimmed.to_string())
    }
}
