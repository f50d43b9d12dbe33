//! Output sinks: CCP4/MRC volume writing and JSON run logs.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use denscore::grid::lattice::Grid3D;

/// Destination for the volumes the pipeline produces (Z-maps, event maps,
/// statistical maps). Implementations decide the directory layout; write
/// failures propagate to the caller untouched.
pub trait MapSink: Sync {
    fn write_map(&self, name: &str, grid: &Grid3D, values: &[f32]) -> io::Result<()>;
}

/// Sink that discards everything; used by tests and dry runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MapSink for NullSink {
    fn write_map(&self, _name: &str, _grid: &Grid3D, _values: &[f32]) -> io::Result<()> {
        Ok(())
    }
}

/// Sink writing CCP4 volumes into one flat directory.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    pub dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(DirectorySink { dir })
    }
}

impl MapSink for DirectorySink {
    fn write_map(&self, name: &str, grid: &Grid3D, values: &[f32]) -> io::Result<()> {
        write_ccp4(&self.dir.join(name), grid, values)
    }
}

pub fn zmap_file_name(dtag: &str) -> String {
    format!("{}-z_map.native.ccp4", dtag)
}

pub fn mean_map_file_name(dtag: &str) -> String {
    format!("{}-ground_state_mean_map.native.ccp4", dtag)
}

pub fn std_map_file_name(dtag: &str) -> String {
    format!("{}-ground_state_std_map.native.ccp4", dtag)
}

/// Event maps are keyed by the occupancy estimate `1 - BDC`.
pub fn event_map_file_name(dtag: &str, event_idx: usize, bdc: f32) -> String {
    format!(
        "{}-event_{}_1-BDC_{:.2}_map.native.ccp4",
        dtag,
        event_idx,
        1.0 - bdc
    )
}

/// Write a volume in CCP4/MRC2014 format, mode 2 (float32), x fastest.
pub fn write_ccp4(path: &Path, grid: &Grid3D, values: &[f32]) -> io::Result<()> {
    if values.len() != grid.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "array length {} does not match grid length {}",
                values.len(),
                grid.len()
            ),
        ));
    }
    let mut header = Vec::with_capacity(1024);
    let push_i32 = |buf: &mut Vec<u8>, v: i32| buf.extend_from_slice(&v.to_le_bytes());
    let push_f32 = |buf: &mut Vec<u8>, v: f32| buf.extend_from_slice(&v.to_le_bytes());

    let [nx, ny, nz] = grid.dims;
    let mut dmin = f32::INFINITY;
    let mut dmax = f32::NEG_INFINITY;
    let mut sum = 0.0f64;
    for &v in values {
        dmin = dmin.min(v);
        dmax = dmax.max(v);
        sum += v as f64;
    }
    let dmean = if values.is_empty() {
        0.0
    } else {
        (sum / values.len() as f64) as f32
    };
    let rms = {
        let mut acc = 0.0f64;
        for &v in values {
            let d = v as f64 - dmean as f64;
            acc += d * d;
        }
        if values.is_empty() {
            0.0
        } else {
            (acc / values.len() as f64).sqrt() as f32
        }
    };

    // words 1-4: dimensions and mode
    push_i32(&mut header, nx as i32);
    push_i32(&mut header, ny as i32);
    push_i32(&mut header, nz as i32);
    push_i32(&mut header, 2);
    // words 5-7: start offsets
    for _ in 0..3 {
        push_i32(&mut header, 0);
    }
    // words 8-10: sampling
    push_i32(&mut header, nx as i32);
    push_i32(&mut header, ny as i32);
    push_i32(&mut header, nz as i32);
    // words 11-16: cell lengths and angles
    push_f32(&mut header, (nx as f64 * grid.spacing) as f32);
    push_f32(&mut header, (ny as f64 * grid.spacing) as f32);
    push_f32(&mut header, (nz as f64 * grid.spacing) as f32);
    for _ in 0..3 {
        push_f32(&mut header, 90.0);
    }
    // words 17-19: axis order
    push_i32(&mut header, 1);
    push_i32(&mut header, 2);
    push_i32(&mut header, 3);
    // words 20-22: density statistics
    push_f32(&mut header, dmin);
    push_f32(&mut header, dmax);
    push_f32(&mut header, dmean);
    // words 23-24: space group, symmetry byte count
    push_i32(&mut header, 1);
    push_i32(&mut header, 0);
    // words 25-49: extra
    for _ in 0..25 {
        push_i32(&mut header, 0);
    }
    // words 50-52: origin
    push_f32(&mut header, grid.origin[0] as f32);
    push_f32(&mut header, grid.origin[1] as f32);
    push_f32(&mut header, grid.origin[2] as f32);
    // word 53: "MAP ", word 54: little-endian machine stamp
    header.extend_from_slice(b"MAP ");
    header.extend_from_slice(&[0x44, 0x41, 0x00, 0x00]);
    // word 55: rms, word 56: label count
    push_f32(&mut header, rms);
    push_i32(&mut header, 0);
    // words 57-256: labels
    header.resize(1024, 0);

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&header)?;
    for &v in values {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.flush()
}

/// Pretty-print a log value as JSON at `path`.
pub fn write_json_log<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.flush()
}
