use std::{collections::BTreeMap, path::PathBuf};

use tracing::{error, info};

use crate::{
    clock::Clock,
    error::ExportError,
    fetcher::IntervalFetcher,
    persist::{mark_no_data, TableSink, WriteOptions},
    resolver::PulseResolver,
    service::QueryService,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub output_file: PathBuf,
    pub start_pulse_id: u64,
    pub stop_pulse_id: u64,
    pub channels: Vec<String>,
    /// Stored as attributes of the output file.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written { path: PathBuf, rows: usize },
    /// The query succeeded without samples; only the marker file was created.
    NoData { marker: PathBuf },
}

/// Resolves the pulse id window, fetches the channels over it and persists the result.
pub async fn write_epics_pvs<RS, RC, FS, FC, W>(
    resolver: &PulseResolver<RS, RC>,
    fetcher: &IntervalFetcher<FS, FC>,
    sink: &W,
    request: &ExportRequest,
) -> Result<ExportOutcome, ExportError>
where
    RS: QueryService,
    RC: Clock,
    FS: QueryService,
    FC: Clock,
    W: TableSink,
{
    if request.channels.is_empty() {
        return Err(ExportError::InvalidRequest("no channels requested".to_owned()));
    }
    if request.start_pulse_id > request.stop_pulse_id {
        return Err(ExportError::InvalidRequest(format!(
            "start pulse id {} is after stop pulse id {}",
            request.start_pulse_id, request.stop_pulse_id
        )));
    }

    info!("Retrieve pulse-id / data mapping for pulse ids");
    let dates = resolver
        .resolve(&[request.start_pulse_id, request.stop_pulse_id])
        .await?;
    let (start_date, end_date) = (dates[0], dates[1]);

    info!("Retrieving data for interval start: {start_date} end: {end_date}");
    let table = fetcher
        .fetch(&request.channels, &start_date, &end_date)
        .await?;

    if table.is_empty() {
        error!("No data retrieved");
        let marker = mark_no_data(&request.output_file).map_err(|source| ExportError::Marker {
            path: request.output_file.clone(),
            source,
        })?;
        return Ok(ExportOutcome::NoData { marker });
    }

    info!(rows = table.rows(), "Persist data to {}", request.output_file.display());
    sink.write(
        &table,
        &request.output_file,
        &request.metadata,
        &WriteOptions::uncompressed(),
    )?;

    Ok(ExportOutcome::Written {
        path: request.output_file.clone(),
        rows: table.rows(),
    })
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, path::Path};

    use serde_json::json;

    use super::*;
    use crate::{
        error::{PersistError, ResolveFailure},
        mock::{sample, ManualClock, ScriptedService},
        query::ChannelData,
        settings::{FetchSettings, ResolverSettings},
        table::DataTable,
    };

    const NOW: &str = "2021-03-04T11:10:00Z";

    #[derive(Default)]
    struct RecordingSink {
        writes: RefCell<Vec<(PathBuf, usize, WriteOptions)>>,
    }

    impl TableSink for RecordingSink {
        fn write(
            &self,
            table: &DataTable,
            destination: &Path,
            _attributes: &BTreeMap<String, String>,
            options: &WriteOptions,
        ) -> Result<(), PersistError> {
            self.writes
                .borrow_mut()
                .push((destination.to_owned(), table.rows(), *options));
            Ok(())
        }
    }

    fn components(
        archive: ScriptedService,
        data: ScriptedService,
    ) -> (
        PulseResolver<ScriptedService, ManualClock>,
        IntervalFetcher<ScriptedService, ManualClock>,
    ) {
        (
            PulseResolver::new(archive, ManualClock::at(NOW), ResolverSettings::default()),
            IntervalFetcher::new(
                data,
                ManualClock::at(NOW),
                FetchSettings::default(),
                chrono_tz::Europe::Zurich,
            ),
        )
    }

    fn request(output_file: PathBuf) -> ExportRequest {
        ExportRequest {
            output_file,
            start_pulse_id: 1000,
            stop_pulse_id: 1100,
            channels: vec!["SLG-LCAM-C042:FIT-XPOS".to_owned()],
            metadata: BTreeMap::new(),
        }
    }

    fn archive() -> ScriptedService {
        ScriptedService::new()
            .reference(1000, "2021-03-04T12:00:00+01:00")
            .reference(1100, "2021-03-04T12:00:01+01:00")
    }

    #[tokio::test]
    async fn writes_fetched_table() {
        let dir = tempfile::tempdir().unwrap();
        let data = ScriptedService::new().reply(vec![ChannelData {
            channel: None,
            data: vec![
                sample(990, "2021-03-04T11:59:59.9+01:00", json!(0.1)),
                sample(1050, "2021-03-04T12:00:00.5+01:00", json!(0.2)),
            ],
        }]);
        let (resolver, fetcher) = components(archive(), data);
        let sink = RecordingSink::default();
        let request = request(dir.path().join("out.h5"));

        let outcome = write_epics_pvs(&resolver, &fetcher, &sink, &request).await.unwrap();

        assert_eq!(
            outcome,
            ExportOutcome::Written {
                path: request.output_file.clone(),
                rows: 2
            }
        );
        assert_eq!(
            sink.writes.borrow().as_slice(),
            &[(request.output_file.clone(), 2, WriteOptions::uncompressed())]
        );
        assert_eq!(resolver.service().calls(), 2);
        assert_eq!(fetcher.service().calls(), 1);
    }

    #[tokio::test]
    async fn empty_result_creates_marker_only() {
        let dir = tempfile::tempdir().unwrap();
        let data = ScriptedService::new().reply(vec![ChannelData {
            channel: None,
            data: vec![],
        }]);
        let (resolver, fetcher) = components(archive(), data);
        let sink = RecordingSink::default();
        let request = request(dir.path().join("out.h5"));

        let outcome = write_epics_pvs(&resolver, &fetcher, &sink, &request).await.unwrap();

        let marker = dir.path().join("out.h5_NO_DATA");
        assert_eq!(outcome, ExportOutcome::NoData { marker: marker.clone() });
        assert!(marker.exists());
        assert!(!request.output_file.exists());
        assert!(sink.writes.borrow().is_empty());
    }

    #[tokio::test]
    async fn resolution_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ScriptedService::new()
            .reference(1000, "2021-03-04T12:00:00+01:00")
            .fail(500);
        let (resolver, fetcher) = components(archive, ScriptedService::new());
        let sink = RecordingSink::default();
        let request = request(dir.path().join("out.h5"));

        let err = write_epics_pvs(&resolver, &fetcher, &sink, &request).await.unwrap_err();

        match err {
            ExportError::Resolution(err) => {
                assert_eq!(err.pulse_id, 1100);
                assert!(matches!(err.cause, ResolveFailure::Transport(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(fetcher.service().calls(), 0);
        assert!(sink.writes.borrow().is_empty());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn invalid_requests_make_no_queries() {
        let (resolver, fetcher) = components(ScriptedService::new(), ScriptedService::new());
        let sink = RecordingSink::default();

        let mut reversed = request(PathBuf::from("out.h5"));
        reversed.start_pulse_id = 2000;
        let mut no_channels = request(PathBuf::from("out.h5"));
        no_channels.channels.clear();

        for request in [reversed, no_channels] {
            let err = write_epics_pvs(&resolver, &fetcher, &sink, &request).await.unwrap_err();
            assert!(matches!(err, ExportError::InvalidRequest(_)));
        }
        assert_eq!(resolver.service().calls(), 0);
    }
}
