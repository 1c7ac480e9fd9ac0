use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::{FetchError, ServiceError},
    query::{ChannelData, SampleQuery},
    service::QueryService,
    settings::FetchSettings,
    table::DataTable,
};

/// Bulk retrieval of channel samples over a resolved date window.
pub struct IntervalFetcher<S, C> {
    service: S,
    clock: C,
    settings: FetchSettings,
    timezone: Tz,
}

impl<S: QueryService, C: Clock> IntervalFetcher<S, C> {
    pub fn new(service: S, clock: C, settings: FetchSettings, timezone: Tz) -> Self {
        Self {
            service,
            clock,
            settings,
            timezone,
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

    pub async fn fetch(
        &self,
        channels: &[String],
        start: &DateTime<FixedOffset>,
        end: &DateTime<FixedOffset>,
    ) -> Result<DataTable, FetchError> {
        info!("Requesting range {start} to {end}.");
        info!("Retrieve data for channels: {channels:?}");

        let query = SampleQuery::interval(channels, start, end);
        debug!(?query);

        let reply = self.query_with_retry(&query).await?;
        info!("Data retrieval is successful");

        DataTable::from_reply(reply, channels, &self.timezone)
    }

    /// One attempt plus up to `retries` more, each preceded by the fixed retry delay.
    /// A reply that arrived but can't be decoded is not retried.
    async fn query_with_retry(&self, query: &SampleQuery) -> Result<Vec<ChannelData>, FetchError> {
        let mut attempt = 1;
        loop {
            match self.service.query(query).await {
                Ok(reply) => return Ok(reply),
                Err(ServiceError::Decode(err)) => return Err(FetchError::Malformed(err.to_string())),
                Err(err) if attempt > self.settings.retries => {
                    return Err(FetchError::Exhausted {
                        attempts: attempt,
                        source: err,
                    })
                }
                Err(err) => {
                    warn!(error = %err, "Data retrieval failed, post attempt {attempt}");
                    self.clock.sleep(self.settings.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
