use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::impl_record;

/// Generates `as_str`, `Display` and a case-insensitive `FromStr` for a
/// fieldless enum whose serde names are given explicitly.
macro_rules! labelled_enum {
    ($name:ident { $($variant:ident => $label:literal $(| $alias:literal)*),* $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lowered = s.trim().to_lowercase();
                $(
                    if lowered == $label.to_lowercase() $(|| lowered == $alias)* {
                        return Ok($name::$variant);
                    }
                )*
                Err(format!("Unknown {}: {s}", stringify!($name)))
            }
        }
    };
}

// Staff

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaffStatus {
    Available,
    Busy,
    Meeting,
    Cuti,
    Offline,
}

labelled_enum!(StaffStatus {
    Available => "available" | "ada" | "hadir",
    Busy => "busy" | "sibuk",
    Meeting => "meeting" | "mesyuarat",
    Cuti => "cuti" | "bercuti" | "leave",
    Offline => "offline" | "keluar",
});

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub position: String,
    pub department: String,
    pub status: StaffStatus,
    pub email: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStaffMember {
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub department: String,
    #[serde(default = "default_staff_status")]
    pub status: StaffStatus,
    pub email: String,
}

fn default_staff_status() -> StaffStatus {
    StaffStatus::Available
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffPatch {
    pub name: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub status: Option<StaffStatus>,
    pub email: Option<String>,
}

/// One roster row as read from the spreadsheet.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffData {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub position: String,
    pub department: String,
    pub status: String,
    pub email: String,
}

// Announcements

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

labelled_enum!(Priority {
    Low => "low",
    Medium => "medium",
    High => "high",
});

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub content: String,
    pub author: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnnouncement {
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementPatch {
    pub content: Option<String>,
    pub author: Option<String>,
    pub priority: Option<Priority>,
}

// Events

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Meeting,
    Training,
    Holiday,
    #[default]
    Other,
}

labelled_enum!(EventType {
    Meeting => "meeting" | "mesyuarat",
    Training => "training" | "latihan",
    Holiday => "holiday" | "cuti",
    Other => "other",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
}

labelled_enum!(EventStatus {
    Scheduled => "scheduled",
    Ongoing => "ongoing",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hhmm::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hhmm::option")]
    pub end_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizer: Option<String>,
    #[serde(rename = "type", default)]
    pub event_type: EventType,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_in_charge: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date: NaiveDate,
    #[serde(default, with = "hhmm::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm::option")]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub organizer: Option<String>,
    #[serde(rename = "type", default)]
    pub event_type: EventType,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub staff_in_charge: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(default, with = "hhmm::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "hhmm::option")]
    pub end_time: Option<NaiveTime>,
    pub location: Option<String>,
    pub organizer: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    pub status: Option<EventStatus>,
    pub staff_in_charge: Option<String>,
}

/// `HH:MM` wire format for optional wall-clock times.
pub mod hhmm {
    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(text) => NaiveTime::parse_from_str(text, "%H:%M")
                    .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
                    .map(Some)
                    .map_err(serde::de::Error::custom),
            }
        }
    }
}

// Assets

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AssetType {
    Equipment,
    Room,
    Vehicle,
    #[default]
    Other,
}

labelled_enum!(AssetType {
    Equipment => "Equipment",
    Room => "Room",
    Vehicle => "Vehicle",
    Other => "Other",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AssetStatus {
    #[default]
    Available,
    #[serde(rename = "In Use")]
    InUse,
    Maintenance,
    Reserved,
}

labelled_enum!(AssetStatus {
    Available => "Available",
    InUse => "In Use" | "in-use" | "inuse",
    Maintenance => "Maintenance" | "under maintenance",
    Reserved => "Reserved",
});

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub status: AssetStatus,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_maintenance: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_maintenance: Option<NaiveDate>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    pub name: String,
    #[serde(rename = "type", default)]
    pub asset_type: AssetType,
    #[serde(default)]
    pub status: AssetStatus,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub last_maintenance: Option<NaiveDate>,
    #[serde(default)]
    pub next_maintenance: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<AssetType>,
    pub status: Option<AssetStatus>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub last_maintenance: Option<NaiveDate>,
    pub next_maintenance: Option<NaiveDate>,
}

// Documents

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Processing,
    Completed,
    Error,
}

labelled_enum!(DocumentStatus {
    Processing => "processing",
    Completed => "completed",
    Error => "error",
});

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    pub author: Option<String>,
    pub tags: Option<Vec<String>>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    pub content: String,
    pub uploaded_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub file_size: u64,
    pub file_type: String,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<MetadataPatch>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    pub name: Option<String>,
    pub content: Option<String>,
    pub status: Option<DocumentStatus>,
    pub chunks: Option<usize>,
    pub processing_error: Option<String>,
    pub metadata: Option<MetadataPatch>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    pub total: usize,
    pub completed: usize,
    pub processing: usize,
    pub error: usize,
    pub total_size: u64,
    pub average_size: f64,
    pub by_file_type: BTreeMap<String, usize>,
}

// Countdowns

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub target_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// A countdown target as forms send it: a full RFC 3339 instant or a bare
/// `YYYY-MM-DD` from a date picker. Anything else is kept as unreadable so
/// the caller can reject it with its own message.
#[derive(Clone, Debug, PartialEq)]
pub enum TargetDate {
    At(DateTime<Utc>),
    Day(NaiveDate),
    Unreadable(String),
}

impl TargetDate {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return TargetDate::At(at.with_timezone(&Utc));
        }
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(day) => TargetDate::Day(day),
            Err(_) => TargetDate::Unreadable(raw.to_string()),
        }
    }

    /// The instant this target names; a bare day starts at local midnight.
    pub fn resolve(&self, offset: &FixedOffset) -> Option<DateTime<Utc>> {
        match self {
            TargetDate::At(at) => Some(*at),
            TargetDate::Day(day) => offset
                .from_local_datetime(&day.and_time(NaiveTime::MIN))
                .single()
                .map(|at| at.with_timezone(&Utc)),
            TargetDate::Unreadable(_) => None,
        }
    }
}

impl From<DateTime<Utc>> for TargetDate {
    fn from(at: DateTime<Utc>) -> Self {
        TargetDate::At(at)
    }
}

impl Serialize for TargetDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TargetDate::At(at) => serializer.serialize_str(&at.to_rfc3339()),
            TargetDate::Day(day) => serializer.collect_str(&day.format("%Y-%m-%d")),
            TargetDate::Unreadable(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for TargetDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(raw) => TargetDate::parse(&raw),
            other => TargetDate::Unreadable(other.to_string()),
        })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCountdown {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub target_date: Option<TargetDate>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub target_date: Option<TargetDate>,
    pub is_active: Option<bool>,
}

// Dashboard

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeatureWidth {
    Full,
    #[default]
    Half,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatBubbleSize {
    Small,
    #[default]
    Medium,
    Large,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureItem {
    pub id: String,
    pub content: String,
    pub enabled: bool,
    pub order: u32,
    pub width: FeatureWidth,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewsSettings {
    pub enabled: bool,
    pub auto_scroll: bool,
    /// Minutes between refreshes.
    pub refresh_interval: u32,
    pub display_count: usize,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_scroll: true,
            refresh_interval: 5,
            display_count: 5,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsSettingsPatch {
    pub enabled: Option<bool>,
    pub auto_scroll: Option<bool>,
    pub refresh_interval: Option<u32>,
    pub display_count: Option<usize>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoSettings {
    pub enabled: bool,
    pub embed_url: String,
    pub autoplay: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSettingsPatch {
    pub enabled: Option<bool>,
    pub embed_url: Option<String>,
    pub autoplay: Option<bool>,
}

/// Body accepted by `PUT /api/dashboard`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardPatch {
    pub features: Option<Vec<FeatureItem>>,
    pub chat_bubble_size: Option<ChatBubbleSize>,
    pub news_settings: Option<NewsSettingsPatch>,
    pub video_settings: Option<VideoSettingsPatch>,
    pub feature_widths: Option<BTreeMap<String, FeatureWidth>>,
}

impl_record!(StaffMember, Announcement, Event, Asset, Document, Countdown, FeatureItem);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_labels_parse_case_insensitively() {
        assert_eq!("Available".parse::<StaffStatus>().unwrap(), StaffStatus::Available);
        assert_eq!("MESYUARAT".parse::<StaffStatus>().unwrap(), StaffStatus::Meeting);
        assert_eq!("in use".parse::<AssetStatus>().unwrap(), AssetStatus::InUse);
        assert!("sleeping".parse::<StaffStatus>().is_err());
    }

    #[test]
    fn event_times_use_hh_mm() {
        let raw = r#"{"id":"1","title":"Mesyuarat","date":"2026-10-20","startTime":"09:00","type":"meeting"}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.start_time, NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(event.end_time, None);
        assert_eq!(event.status, EventStatus::Scheduled);

        let out = serde_json::to_value(&event).unwrap();
        assert_eq!(out["startTime"], "09:00");
        assert_eq!(out["type"], "meeting");
        assert!(out.get("endTime").is_none());
    }

    #[test]
    fn countdown_targets_accept_picker_dates() {
        let myt = FixedOffset::east_opt(8 * 3600).unwrap();
        let input: NewCountdown =
            serde_json::from_str(r#"{"title":"Cuti Sekolah","targetDate":"2099-12-25"}"#).unwrap();
        let target = input.target_date.unwrap();
        assert_eq!(target, TargetDate::Day(NaiveDate::from_ymd_opt(2099, 12, 25).unwrap()));
        assert_eq!(
            target.resolve(&myt),
            Some(Utc.with_ymd_and_hms(2099, 12, 24, 16, 0, 0).unwrap())
        );

        let exact = TargetDate::parse("2099-12-25T09:30:00+08:00");
        assert_eq!(exact.resolve(&myt), Some(Utc.with_ymd_and_hms(2099, 12, 25, 1, 30, 0).unwrap()));

        let patch: CountdownPatch = serde_json::from_str(r#"{"targetDate":"soon"}"#).unwrap();
        assert_eq!(patch.target_date.unwrap().resolve(&myt), None);
        let patch: CountdownPatch = serde_json::from_str(r#"{"targetDate":42}"#).unwrap();
        assert!(matches!(patch.target_date, Some(TargetDate::Unreadable(_))));
        let patch: CountdownPatch = serde_json::from_str(r#"{"targetDate":null}"#).unwrap();
        assert!(patch.target_date.is_none());
    }

    #[test]
    fn asset_status_keeps_display_names() {
        let out = serde_json::to_value(AssetStatus::InUse).unwrap();
        assert_eq!(out, "In Use");
    }
}
