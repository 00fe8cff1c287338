//
// codec.rs
// CMR-Curate-rs
//
// Byte-level collaborator: opens plain or gzip DICOM files, encodes objects, and writes outputs atomically.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use dicom::object::{from_reader, DefaultDicomObject};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::FileError;

pub const COMPRESSED_EXTENSION: &str = "dcm.gz";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const PREAMBLE_LEN: usize = 128;

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Read a file, transparently inflating it when it is gzip-compressed.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>, FileError> {
    let raw = fs::read(path).map_err(|e| FileError::unreadable(path, e))?;
    if !is_gzip(&raw) {
        return Ok(raw);
    }
    let mut inflated = Vec::with_capacity(raw.len() * 2);
    GzDecoder::new(raw.as_slice())
        .read_to_end(&mut inflated)
        .map_err(|e| FileError::unreadable(path, format!("corrupt gzip stream: {e}")))?;
    Ok(inflated)
}

/// Parse a complete DICOM file image, with or without the 128 byte preamble.
pub fn parse(path: &Path, bytes: &[u8]) -> Result<DefaultDicomObject, FileError> {
    let body = if bytes.len() >= PREAMBLE_LEN + 4 && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + 4] == b"DICM"
    {
        &bytes[PREAMBLE_LEN..]
    } else {
        bytes
    };
    from_reader(body).map_err(|e| FileError::unreadable(path, e))
}

pub fn open(path: &Path) -> Result<DefaultDicomObject, FileError> {
    let bytes = read_bytes(path)?;
    parse(path, &bytes)
}

/// Encode an object as a full DICOM file image (preamble, magic, meta group, data set).
pub fn encode(obj: &DefaultDicomObject, path: &Path) -> Result<Vec<u8>, FileError> {
    let mut buffer = Vec::new();
    obj.write_all(&mut buffer).map_err(|e| FileError::Encode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(buffer)
}

pub fn write_compressed(path: &Path, bytes: &[u8]) -> Result<(), FileError> {
    write_atomically(path, |file| {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(bytes)?;
        encoder.finish()?.sync_all()
    })
}

pub fn write_plain(path: &Path, bytes: &[u8]) -> Result<(), FileError> {
    write_atomically(path, |mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    })
}

/// File name without the `.dcm` / `.dcm.gz` suffix.
pub fn dicom_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let lower = name.to_ascii_lowercase();
    let stem = [".dcm.gz", ".dcm", ".gz"]
        .iter()
        .find(|suffix| lower.ends_with(*suffix))
        .map(|suffix| &name[..name.len() - suffix.len()])
        .unwrap_or(name);
    Some(stem.to_string())
}

// Write to a sibling `.part` file and rename it over the destination so a
// crash never leaves a truncated output under its final name.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), FileError>
where
    F: FnOnce(File) -> std::io::Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FileError::write(parent, e))?;
    }
    let partial = partial_path(path);
    let result = File::create(&partial)
        .and_then(write)
        .and_then(|_| fs::rename(&partial, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(FileError::write(path, e));
    }
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}
