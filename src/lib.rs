//! Export of EPICS channel samples for a window of beamline pulse ids.
//!
//! The pulse ids are first mapped to dates through the archive
//! ([`resolver`]), the channels are then fetched over the resulting date
//! window ([`fetcher`]) and written out ([`persist`]). [`export`] ties the
//! three together.

pub mod clock;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod persist;
pub mod query;
pub mod resolver;
pub mod service;
pub mod settings;
pub mod table;

#[cfg(test)]
pub(crate) mod mock;

pub use clock::{Clock, SystemClock};
pub use error::{ExportError, FetchError, PersistError, ResolutionError, ResolveFailure, ServiceError};
pub use export::{write_epics_pvs, ExportOutcome, ExportRequest};
pub use fetcher::IntervalFetcher;
pub use persist::{read_table, BincodeSink, TableSink, WriteOptions};
pub use resolver::PulseResolver;
pub use service::{HttpQueryService, QueryService};
pub use settings::Settings;
pub use table::DataTable;
