//! Tabular form of a bulk `/query` reply: one row per distinct `globalDate`,
//! one column group per channel.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{error::FetchError, query::ChannelData};

/// A single sample value. Json objects are kept as their json text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<Option<Cell>>),
}

impl Cell {
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Cell::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Cell::Int)
                .or_else(|| n.as_f64().map(Cell::Float)),
            Value::String(s) => Some(Cell::Text(s.clone())),
            Value::Array(items) => Some(Cell::Array(items.iter().map(Cell::from_json).collect())),
            Value::Object(_) => Some(Cell::Text(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelColumns {
    pub name: String,
    pub pulse_id: Vec<Option<u64>>,
    pub global_seconds: Vec<Option<String>>,
    pub value: Vec<Option<Cell>>,
    pub event_count: Vec<Option<u64>>,
}

impl ChannelColumns {
    fn empty(name: String, rows: usize) -> Self {
        Self {
            name,
            pulse_id: vec![None; rows],
            global_seconds: vec![None; rows],
            value: vec![None; rows],
            event_count: vec![None; rows],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub index: Vec<DateTime<FixedOffset>>,
    /// Ordered by natural sort of the channel name.
    pub channels: Vec<ChannelColumns>,
}

impl DataTable {
    /// Builds the table from a reply to a query over `requested` channels.
    ///
    /// Series without a channel name take the requested name at the same position.
    /// When a channel has several samples at one instant the last one wins.
    pub fn from_reply(
        reply: Vec<ChannelData>,
        requested: &[String],
        tz: &Tz,
    ) -> Result<Self, FetchError> {
        let mut series = Vec::with_capacity(reply.len());
        for (position, channel) in reply.into_iter().enumerate() {
            let name = match (&channel.channel, requested.get(position)) {
                (Some(name), _) => name.name.clone(),
                (None, Some(name)) => name.clone(),
                (None, None) => {
                    return Err(FetchError::Malformed(format!(
                        "unnamed series at position {position}"
                    )))
                }
            };

            let mut samples = Vec::with_capacity(channel.data.len());
            for record in channel.data {
                let date = record.global_date(tz).ok_or_else(|| {
                    FetchError::Malformed(format!("{name}: bad globalDate in {record:?}"))
                })?;
                samples.push((date, record));
            }
            series.push((name, samples));
        }

        let index = series
            .iter()
            .flat_map(|(_, samples)| samples.iter().map(|(date, _)| *date))
            .sorted()
            .dedup()
            .collect::<Vec<_>>();
        let rows: BTreeMap<_, _> = index.iter().enumerate().map(|(row, date)| (*date, row)).collect();

        let channels = series
            .into_iter()
            .map(|(name, samples)| {
                let mut columns = ChannelColumns::empty(name, index.len());
                for (date, record) in samples {
                    let row = rows[&date];
                    columns.pulse_id[row] = record.pulse_id;
                    columns.global_seconds[row] = record.global_seconds.as_ref().map(|seconds| {
                        seconds
                            .as_str()
                            .map(str::to_owned)
                            .unwrap_or_else(|| seconds.to_string())
                    });
                    columns.value[row] = record.value.as_ref().and_then(Cell::from_json);
                    columns.event_count[row] = record.event_count;
                }
                columns
            })
            .sorted_by(|a, b| natord::compare(&a.name, &b.name))
            .collect();

        Ok(Self { index, channels })
    }

    pub fn rows(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelColumns> {
        self.channels.iter().find(|columns| columns.name == name)
    }
}
