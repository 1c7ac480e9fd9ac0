//! On-disk form of a [`DataTable`].
//!
//! A table file starts with the `EPICSTAB` magic and a little-endian format
//! version, followed by the bincode encoded [`TableFile`] document which names
//! every channel and column it holds.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::PersistError, table::DataTable};

const MAGIC: &[u8; 8] = b"EPICSTAB";
const FORMAT_VERSION: u32 = 1;

pub const NO_DATA_SUFFIX: &str = "_NO_DATA";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub overwrite: bool,
    pub compression: Option<u8>,
    pub shuffle: bool,
}

impl WriteOptions {
    /// Replace any existing file, no compression, no shuffling.
    pub fn uncompressed() -> Self {
        Self {
            overwrite: true,
            compression: None,
            shuffle: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFile {
    pub attributes: BTreeMap<String, String>,
    pub table: DataTable,
}

pub trait TableSink {
    fn write(
        &self,
        table: &DataTable,
        destination: &Path,
        attributes: &BTreeMap<String, String>,
        options: &WriteOptions,
    ) -> Result<(), PersistError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSink;

impl TableSink for BincodeSink {
    fn write(
        &self,
        table: &DataTable,
        destination: &Path,
        attributes: &BTreeMap<String, String>,
        options: &WriteOptions,
    ) -> Result<(), PersistError> {
        if options.compression.is_some() {
            return Err(PersistError::Unsupported("compression"));
        }
        if options.shuffle {
            return Err(PersistError::Unsupported("shuffle"));
        }

        let mut open = OpenOptions::new();
        open.write(true);
        if options.overwrite {
            open.create(true).truncate(true);
        } else {
            open.create_new(true);
        }
        let file = open.open(destination).map_err(|err| match err.kind() {
            std::io::ErrorKind::AlreadyExists => PersistError::AlreadyExists(destination.to_owned()),
            _ => PersistError::Io(err),
        })?;

        let document = TableFile {
            attributes: attributes.clone(),
            table: table.clone(),
        };

        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut writer, &document)?;
        writer.flush()?;
        Ok(())
    }
}

pub fn read_table(filepath: &Path) -> Result<TableFile, PersistError> {
    let mut reader = BufReader::new(File::open(filepath)?);

    let mut magic = [0u8; 8];
    let mut version = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .and_then(|_| reader.read_exact(&mut version))
        .map_err(|_| PersistError::BadHeader(filepath.to_owned()))?;
    if &magic != MAGIC || u32::from_le_bytes(version) != FORMAT_VERSION {
        return Err(PersistError::BadHeader(filepath.to_owned()));
    }

    Ok(bincode::deserialize_from(reader)?)
}

/// `<output>_NO_DATA`, next to `output`.
pub fn no_data_marker_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(NO_DATA_SUFFIX);
    output.with_file_name(name)
}

/// Touches the no-data marker of `output` and returns its path.
pub fn mark_no_data(output: &Path) -> std::io::Result<PathBuf> {
    let marker = no_data_marker_path(output);
    OpenOptions::new().create(true).append(true).open(&marker)?;
    Ok(marker)
}
