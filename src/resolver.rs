//! Pulse id to wall-clock date mapping.
//!
//! The archive is asked for the latest reference channel sample at or before
//! the pulse id. When that sample is older than the pulse id the archive is
//! still ingesting: the resolver waits once, until the reference sample date
//! plus the catch-up slack, and asks again. A second miss is fatal.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tracing::info;

use crate::{
    clock::Clock,
    error::{ResolutionError, ResolveFailure, ServiceError},
    query::{ChannelData, SampleQuery, SampleRecord},
    service::QueryService,
    settings::ResolverSettings,
};

pub struct PulseResolver<S, C> {
    service: S,
    clock: C,
    settings: ResolverSettings,
}

impl<S: QueryService, C: Clock> PulseResolver<S, C> {
    pub fn new(service: S, clock: C, settings: ResolverSettings) -> Self {
        Self {
            service,
            clock,
            settings,
        }
    }

    #[cfg(test)]
    pub(crate) fn service(&self) -> &S {
        &self.service
    }

    #[cfg(test)]
    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    /// Dates of `pulse_ids`, in input order. Fails as a whole on the first pulse id that can't be mapped.
    pub async fn resolve(
        &self,
        pulse_ids: &[u64],
    ) -> Result<Vec<DateTime<FixedOffset>>, ResolutionError> {
        let mut dates = Vec::with_capacity(pulse_ids.len());
        for &pulse_id in pulse_ids {
            let date = self
                .resolve_one(pulse_id)
                .await
                .map_err(|cause| ResolutionError { pulse_id, cause })?;
            dates.push(date);
        }
        Ok(dates)
    }

    async fn resolve_one(&self, pulse_id: u64) -> Result<DateTime<FixedOffset>, ResolveFailure> {
        let query = SampleQuery::latest_at_or_before(&self.settings.reference_channel, pulse_id);

        for attempt in 1..=self.settings.max_attempts {
            info!("Retrieve mapping for pulse_id {pulse_id}");

            let reply = self
                .service
                .query(&query)
                .await
                .map_err(|err| match err {
                    ServiceError::Decode(err) => ResolveFailure::Malformed(err.to_string()),
                    err => ResolveFailure::Transport(err),
                })?;
            let reference = latest_sample(&reply)?;
            let latest = reference.pulse_id.unwrap_or_default();

            if latest == pulse_id {
                return self.sample_date(reference);
            }

            info!(pulse_id, latest, attempt, "retrieval failed");
            if attempt > 1 {
                return Err(ResolveFailure::Stale {
                    requested: pulse_id,
                    latest,
                });
            }

            let wait = self.catch_up_wait(reference)?;
            info!("retry in {} seconds", wait.as_secs_f64());
            if !wait.is_zero() {
                self.clock.sleep(wait).await;
            }
        }

        Err(ResolveFailure::Exhausted {
            attempts: self.settings.max_attempts,
        })
    }

    /// Time left until the archive should hold samples `catch_up_slack` newer than `reference`.
    fn catch_up_wait(&self, reference: &SampleRecord) -> Result<Duration, ResolveFailure> {
        let check_date = self.sample_date(reference)? + self.slack()?;
        let now = self.clock.now().with_timezone(&self.settings.timezone);
        // negative deltas fail the conversion
        Ok(check_date
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO))
    }

    fn slack(&self) -> Result<chrono::Duration, ResolveFailure> {
        chrono::Duration::from_std(self.settings.catch_up_slack)
            .map_err(|_| ResolveFailure::Malformed("catch-up slack out of range".to_owned()))
    }

    fn sample_date(&self, record: &SampleRecord) -> Result<DateTime<FixedOffset>, ResolveFailure> {
        record.global_date(&self.settings.timezone).ok_or_else(|| {
            ResolveFailure::Malformed(format!("bad globalDate in {record:?}"))
        })
    }
}

fn latest_sample(reply: &[ChannelData]) -> Result<&SampleRecord, ResolveFailure> {
    reply
        .first()
        .and_then(|series| series.data.first())
        .filter(|record| record.pulse_id.is_some())
        .ok_or_else(|| ResolveFailure::Malformed(format!("{reply:?}")))
}
