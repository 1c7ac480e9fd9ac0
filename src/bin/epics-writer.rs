//! Writes the EPICS channels of a pulse id window to a table file.
//!
//! ```text
//! epics-writer --config writer.yaml --channels-file pvs.txt \
//!     --meta pgroup=p12345 /data/run_0001.PVDATA.h5 11803296014 11803297014
//! ```

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use eyre::{bail, Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use epics_writer::{
    write_epics_pvs, BincodeSink, ExportOutcome, ExportRequest, HttpQueryService,
    IntervalFetcher, PulseResolver, Settings, SystemClock,
};

#[cfg(target_family = "unix")]
use tikv_jemallocator::Jemalloc;
#[cfg(target_family = "unix")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Arg {
    /// Output table file
    pub output_file: PathBuf,
    /// First pulse id of the window
    pub start_pulse_id: u64,
    /// Last pulse id of the window
    pub stop_pulse_id: u64,
    /// Channels to export
    pub channels: Vec<String>,
    /// File with one channel per line (`#` starts a comment)
    #[clap(long)]
    pub channels_file: Option<PathBuf>,
    /// Path to the config file in yaml format
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// Metadata stored with the output, as key=value
    #[clap(long = "meta", value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,
}

fn parse_key_val(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{arg}`"))
}

fn read_channels(filepath: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(filepath)
        .wrap_err_with(|| format!("unable to read {}", filepath.display()))?;
    Ok(text
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Arg::parse();

    let settings = match &args.config {
        Some(filepath) => Settings::load(filepath)?,
        None => Settings::default(),
    }
    .with_env();

    let mut channels = args.channels.clone();
    if let Some(filepath) = &args.channels_file {
        channels.extend(read_channels(filepath)?);
    }
    if channels.is_empty() {
        bail!("no channels given");
    }

    let resolver = PulseResolver::new(
        HttpQueryService::new(&settings.resolver.url, settings.http.timeout)?,
        SystemClock,
        settings.resolver.clone(),
    );
    let fetcher = IntervalFetcher::new(
        HttpQueryService::new(&settings.fetch.url, settings.http.timeout)?,
        SystemClock,
        settings.fetch.clone(),
        settings.resolver.timezone,
    );

    let request = ExportRequest {
        output_file: args.output_file,
        start_pulse_id: args.start_pulse_id,
        stop_pulse_id: args.stop_pulse_id,
        channels,
        metadata: args.metadata.into_iter().collect::<BTreeMap<_, _>>(),
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("[{elapsed_precise}] {spinner} {msg}")?);
    pb.set_message(format!(
        "exporting pulse ids {}..={}",
        request.start_pulse_id, request.stop_pulse_id
    ));
    pb.enable_steady_tick(Duration::from_millis(250));

    let outcome = write_epics_pvs(&resolver, &fetcher, &BincodeSink, &request).await;
    pb.finish_and_clear();

    match outcome.wrap_err("epics export failed")? {
        ExportOutcome::Written { path, rows } => {
            tracing::info!("wrote {rows} rows to {}", path.display())
        }
        ExportOutcome::NoData { marker } => {
            tracing::warn!("no data in window, created {}", marker.display())
        }
    }

    Ok(())
}
