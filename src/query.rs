//! Wire types of the data-api `/query` endpoint.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const FIELD_PULSE_ID: &str = "pulseId";
pub const FIELD_GLOBAL_DATE: &str = "globalDate";
pub const FIELD_GLOBAL_SECONDS: &str = "globalSeconds";
pub const FIELD_VALUE: &str = "value";
pub const FIELD_EVENT_COUNT: &str = "eventCount";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ordering {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryRange {
    #[serde(rename_all = "camelCase")]
    PulseId {
        start_pulse_id: u64,
        end_pulse_id: u64,
    },
    #[serde(rename_all = "camelCase")]
    Date {
        start_date: String,
        end_date: String,
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        start_expansion: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleQuery {
    pub range: QueryRange,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ordering: Option<Ordering>,
    pub channels: Vec<String>,
    pub fields: Vec<String>,
}

impl SampleQuery {
    /// Latest sample of `channel` at or before `pulse_id`.
    pub fn latest_at_or_before(channel: &str, pulse_id: u64) -> Self {
        Self {
            range: QueryRange::PulseId {
                start_pulse_id: 0,
                end_pulse_id: pulse_id,
            },
            limit: Some(1),
            ordering: Some(Ordering::Desc),
            channels: vec![channel.to_owned()],
            fields: vec![FIELD_PULSE_ID.to_owned(), FIELD_GLOBAL_DATE.to_owned()],
        }
    }

    /// All samples of `channels` in `[start, end]`, expanded to the last sample before `start`.
    pub fn interval(
        channels: &[String],
        start: &DateTime<FixedOffset>,
        end: &DateTime<FixedOffset>,
    ) -> Self {
        Self {
            range: QueryRange::Date {
                start_date: start.to_rfc3339(),
                end_date: end.to_rfc3339(),
                start_expansion: true,
            },
            limit: None,
            ordering: None,
            channels: channels.to_vec(),
            fields: [
                FIELD_PULSE_ID,
                FIELD_GLOBAL_SECONDS,
                FIELD_GLOBAL_DATE,
                FIELD_VALUE,
                FIELD_EVENT_COUNT,
            ]
            .iter()
            .map(|field| field.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_seconds: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_count: Option<u64>,
}

impl SampleRecord {
    /// `globalDate` as a timezone-aware timestamp, see [`parse_global_date`].
    pub fn global_date(&self, tz: &Tz) -> Option<DateTime<FixedOffset>> {
        self.global_date
            .as_deref()
            .and_then(|date| parse_global_date(date, tz))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelName {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

/// One element of the `/query` reply, one per requested channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelName>,
    #[serde(default)]
    pub data: Vec<SampleRecord>,
}

/// Parses an ISO-8601 date as delivered by the archive.
///
/// Dates carrying an offset keep it; offset-less dates are read as civil time in `tz`
/// (the earlier instant wins inside a DST fold).
pub fn parse_global_date(date: &str, tz: &Tz) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
        return Some(parsed);
    }
    let naive = NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    let local = tz.from_local_datetime(&naive).earliest()?;
    Some(local.with_timezone(&local.offset().fix()))
}
