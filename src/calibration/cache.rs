//! Versioned on-disk calibration cache.
//!
//! Format: header `"sane_genesys"` (length-prefixed), a version integer
//! (current = 27), then a length-prefixed list of entries. Any header or
//! version mismatch means "start with an empty cache" — never an error.

use std::io::{self, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::CalibrationCacheEntry;
use crate::error::{GenesysError, Result};

const HEADER: &[u8] = b"sane_genesys";
const VERSION: u32 = 27;

/// Reads a calibration cache file. Returns an empty vector, rather than an
/// error, whenever the header or version does not match — a stale or
/// foreign file must never block a scan.
pub fn read_calibration(path: &Path) -> Vec<CalibrationCacheEntry> {
    match read_calibration_inner(path) {
        Ok(entries) => entries,
        Err(err) => {
            log::info!("calibration cache at {:?} unreadable ({err}), starting empty", path);
            Vec::new()
        }
    }
}

fn read_calibration_inner(path: &Path) -> Result<Vec<CalibrationCacheEntry>> {
    let mut file = std::fs::File::open(path).map_err(|e| GenesysError::io("cache open", e))?;
    let mut header = vec![0u8; HEADER.len()];
    file.read_exact(&mut header).map_err(|e| GenesysError::io("cache header", e))?;
    if header != HEADER {
        return Err(GenesysError::Cache("header mismatch".into()));
    }
    let version = file.read_u32::<LittleEndian>().map_err(|e| GenesysError::io("cache version", e))?;
    if version != VERSION {
        return Err(GenesysError::Cache(format!("version mismatch: {version}")));
    }
    let count = file.read_u32::<LittleEndian>().map_err(|e| GenesysError::io("cache count", e))?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(CalibrationCacheEntry::read_from(&mut file)?);
    }
    Ok(entries)
}

/// Writes a calibration cache file. Best-effort: failures are logged by the
/// caller (`sane_close`), never propagated as a scan error.
pub fn write_calibration(path: &Path, entries: &[CalibrationCacheEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| GenesysError::io("cache mkdir", e))?;
    }
    let mut file = std::fs::File::create(path).map_err(|e| GenesysError::io("cache create", e))?;
    file.write_all(HEADER).map_err(|e| GenesysError::io("cache header", e))?;
    file.write_u32::<LittleEndian>(VERSION).map_err(|e| GenesysError::io("cache version", e))?;
    file.write_u32::<LittleEndian>(entries.len() as u32)
        .map_err(|e| GenesysError::io("cache count", e))?;
    for entry in entries {
        entry.write_to(&mut file)?;
    }
    Ok(())
}

impl CalibrationCacheEntry {
    fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let resolution = r.read_u16::<LittleEndian>().map_err(io_err)?;
        let channels = r.read_u8().map_err(io_err)?;
        let mode = r.read_u8().map_err(io_err)?;
        let method = r.read_u8().map_err(io_err)?;
        let startx = r.read_u32::<LittleEndian>().map_err(io_err)?;
        let pixels = r.read_u32::<LittleEndian>().map_err(io_err)?;
        let depth = r.read_u8().map_err(io_err)?;
        let timestamp = r.read_u64::<LittleEndian>().map_err(io_err)?;
        let average_size = r.read_u32::<LittleEndian>().map_err(io_err)? as usize;

        let mut dark_average_data = vec![0u16; average_size];
        for v in dark_average_data.iter_mut() {
            *v = r.read_u16::<LittleEndian>().map_err(io_err)?;
        }
        let mut white_average_data = vec![0u16; average_size];
        for v in white_average_data.iter_mut() {
            *v = r.read_u16::<LittleEndian>().map_err(io_err)?;
        }

        Ok(CalibrationCacheEntry {
            resolution,
            channels,
            mode,
            method,
            startx,
            pixels,
            depth,
            timestamp,
            average_size,
            dark_average_data,
            white_average_data,
        })
    }

    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u16::<LittleEndian>(self.resolution).map_err(io_err)?;
        w.write_u8(self.channels).map_err(io_err)?;
        w.write_u8(self.mode).map_err(io_err)?;
        w.write_u8(self.method).map_err(io_err)?;
        w.write_u32::<LittleEndian>(self.startx).map_err(io_err)?;
        w.write_u32::<LittleEndian>(self.pixels).map_err(io_err)?;
        w.write_u8(self.depth).map_err(io_err)?;
        w.write_u64::<LittleEndian>(self.timestamp).map_err(io_err)?;
        w.write_u32::<LittleEndian>(self.average_size as u32).map_err(io_err)?;
        for &v in &self.dark_average_data {
            w.write_u16::<LittleEndian>(v).map_err(io_err)?;
        }
        for &v in &self.white_average_data {
            w.write_u16::<LittleEndian>(v).map_err(io_err)?;
        }
        Ok(())
    }
}

fn io_err(e: io::Error) -> GenesysError {
    GenesysError::io("cache codec", e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> CalibrationCacheEntry {
        CalibrationCacheEntry {
            resolution: 400,
            channels: 1,
            mode: 2,
            method: 0,
            startx: 10,
            pixels: 3400,
            depth: 8,
            timestamp: 1_700_000_000,
            average_size: 4,
            dark_average_data: vec![10, 11, 12, 13],
            white_average_data: vec![60000, 59000, 61000, 58000],
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.cal");
        let entries = vec![sample_entry(), sample_entry()];
        write_calibration(&path, &entries).unwrap();
        let read_back = read_calibration(&path);
        assert_eq!(read_back, entries);
    }

    #[test]
    fn header_mismatch_yields_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.cal");
        std::fs::write(&path, b"not a cache file at all").unwrap();
        assert!(read_calibration(&path).is_empty());
    }

    #[test]
    fn version_mismatch_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.cal");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(HEADER).unwrap();
        file.write_u32::<LittleEndian>(1).unwrap();
        file.write_u32::<LittleEndian>(0).unwrap();
        drop(file);
        assert!(read_calibration(&path).is_empty());
    }

    #[test]
    fn missing_file_yields_empty() {
        let path = Path::new("/nonexistent/path/model.cal");
        assert!(read_calibration(path).is_empty());
    }
}
