//! In-memory query service and clock for unit tests.

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::{
    clock::Clock,
    error::ServiceError,
    query::{ChannelData, SampleQuery, SampleRecord},
    service::QueryService,
};

/// Replies with a fixed script, one entry per call, and records every query.
#[derive(Default)]
pub struct ScriptedService {
    replies: Mutex<VecDeque<Result<Vec<ChannelData>, ServiceError>>>,
    queries: Mutex<Vec<SampleQuery>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, reply: Vec<ChannelData>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply));
        self
    }

    pub fn fail(self, status: u16) -> Self {
        self.replies.lock().unwrap().push_back(Err(ServiceError::Status {
            status,
            body: "service unavailable".to_owned(),
        }));
        self
    }

    /// A 200 reply whose body isn't json.
    pub fn undecodable(self) -> Self {
        let err = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        self.replies.lock().unwrap().push_back(Err(ServiceError::Decode(err)));
        self
    }

    /// Reply of the reference channel holding a single sample.
    pub fn reference(self, pulse_id: u64, global_date: &str) -> Self {
        self.reply(vec![ChannelData {
            channel: None,
            data: vec![SampleRecord {
                pulse_id: Some(pulse_id),
                global_date: Some(global_date.to_owned()),
                ..Default::default()
            }],
        }])
    }

    pub fn queries(&self) -> Vec<SampleQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl QueryService for ScriptedService {
    async fn query(&self, query: &SampleQuery) -> Result<Vec<ChannelData>, ServiceError> {
        self.queries.lock().unwrap().push(query.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("query service script exhausted")
    }
}

/// Clock standing still at `now`, advancing only by the sleeps it is asked for.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn at(now: &str) -> Self {
        Self {
            now: Mutex::new(DateTime::parse_from_rfc3339(now).unwrap().with_timezone(&Utc)),
            sleeps: Mutex::new(vec![]),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

pub fn sample(pulse_id: u64, global_date: &str, value: serde_json::Value) -> SampleRecord {
    SampleRecord {
        pulse_id: Some(pulse_id),
        global_date: Some(global_date.to_owned()),
        global_seconds: Some(json!(format!("{pulse_id}.000000000"))),
        value: Some(value),
        event_count: Some(1),
    }
}
