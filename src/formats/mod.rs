//! Object readers: parse storage objects into frames.
//!
//! Objects are fetched whole, optionally gzip-decompressed (`.gz` suffix),
//! and parsed by format into a [`Frame`]. Read failures here are
//! object-local: the batch driver logs and skips the object.

pub mod delimited;
pub mod excel;

use std::io::Read;

use flate2::read::MultiGzDecoder;

use crate::error::{LoadError, Result};
use crate::frame::Frame;

/// Source object format, selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Csv,
    Excel,
}

impl ObjectKind {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ObjectKind::Csv),
            "excel" => Ok(ObjectKind::Excel),
            other => Err(LoadError::configuration(format!(
                "unsupported object type '{other}'. Supported types: csv, excel"
            ))),
        }
    }
}

/// Parse one object body into a frame, decompressing first when the key
/// carries a `.gz` suffix.
pub fn read_object(key: &str, body: &[u8], kind: ObjectKind) -> Result<Frame> {
    let decompressed;
    let data: &[u8] = if key.to_lowercase().ends_with(".gz") {
        decompressed = gunzip(key, body)?;
        &decompressed
    } else {
        body
    };

    match kind {
        ObjectKind::Csv => delimited::read_csv(data)
            .map_err(|err| LoadError::storage_read(format!("{key}: {err}"))),
        ObjectKind::Excel => excel::read_workbook(data)
            .map_err(|err| LoadError::storage_read(format!("{key}: {err}"))),
    }
}

fn gunzip(key: &str, body: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = MultiGzDecoder::new(body);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| LoadError::storage_read(format!("{key}: gzip decompression: {err}")))?;
    Ok(out)
}
