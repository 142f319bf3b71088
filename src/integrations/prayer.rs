//! JAKIM e-solat prayer timetable.

use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

use super::{http_agent, upstream_error};

const ESOLAT_API: &str = "https://www.e-solat.gov.my/index.php";

/// One day of the monthly timetable as e-solat returns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrayerDay {
    pub hijri: String,
    pub date: String,
    pub day: String,
    pub imsak: String,
    pub fajr: String,
    pub syuruk: String,
    pub dhuhr: String,
    pub asr: String,
    pub maghrib: String,
    pub isha: String,
}

#[derive(Deserialize)]
struct TakwimResponse {
    status: String,
    #[serde(rename = "prayerTime", default)]
    prayer_time: Option<Vec<PrayerDay>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrayerSlot {
    pub name: &'static str,
    pub time: String,
    pub current: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timetable {
    pub zone: String,
    pub date: String,
    pub hijri: String,
    pub day: String,
    pub prayers: Vec<PrayerSlot>,
    pub current_prayer: Option<&'static str>,
}

impl PrayerDay {
    fn named(&self) -> [(&'static str, &str); 7] {
        [
            ("Imsak", &self.imsak),
            ("Subuh", &self.fajr),
            ("Syuruk", &self.syuruk),
            ("Zohor", &self.dhuhr),
            ("Asar", &self.asr),
            ("Maghrib", &self.maghrib),
            ("Isyak", &self.isha),
        ]
    }
}

/// e-solat keys days as `19-Oct-2026`.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

pub fn parse_takwim(body: &str) -> ServiceResult<Vec<PrayerDay>> {
    let parsed: TakwimResponse = serde_json::from_str(body)?;
    match parsed.prayer_time {
        Some(days) if parsed.status == "OK!" => Ok(days),
        _ => Err(ServiceError::upstream(format!(
            "Invalid data received from e-solat (status {:?})",
            parsed.status
        ))),
    }
}

fn clock(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// Today's timetable with the prayer in effect at `now` marked. Before Imsak
/// nothing is current; after Isyak, Isyak stays current until midnight.
pub fn timetable(
    zone: &str,
    days: &[PrayerDay],
    today: NaiveDate,
    now: NaiveTime,
) -> ServiceResult<Timetable> {
    let key = day_key(today);
    let day = days
        .iter()
        .find(|d| d.date.eq_ignore_ascii_case(&key))
        .ok_or_else(|| ServiceError::not_found(format!("No prayer times found for {key}")))?;

    let mut prayers = Vec::with_capacity(7);
    let mut current = None;
    for (index, (name, raw)) in day.named().into_iter().enumerate() {
        let at = clock(raw).ok_or_else(|| {
            ServiceError::upstream(format!("Unreadable {name} time {raw:?} for {key}"))
        })?;
        if at <= now {
            current = Some(index);
        }
        prayers.push(PrayerSlot {
            name,
            time: at.format("%H:%M").to_string(),
            current: false,
        });
    }
    if let Some(index) = current {
        prayers[index].current = true;
    }

    Ok(Timetable {
        zone: zone.to_string(),
        date: day.date.clone(),
        hijri: day.hijri.clone(),
        day: day.day.clone(),
        current_prayer: current.map(|i| prayers[i].name),
        prayers,
    })
}

#[derive(Clone)]
pub struct PrayerClient {
    agent: ureq::Agent,
    zone: String,
}

impl PrayerClient {
    pub fn new(zone: String) -> Self {
        Self {
            agent: http_agent(Duration::from_secs(20)),
            zone,
        }
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn fetch_month(&self) -> ServiceResult<Vec<PrayerDay>> {
        let body = self
            .agent
            .get(ESOLAT_API)
            .query("r", "esolatApi/takwimsolat")
            .query("period", "month")
            .query("zone", &self.zone)
            .call()
            .map_err(|e| upstream_error("e-solat", e))?
            .into_string()?;
        parse_takwim(&body)
    }
}
