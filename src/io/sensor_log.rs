//! Recorded sensor streams.
//!
//! One event per line, `#` starts a comment:
//!
//! ```text
//! # timestamp_ns,kind,x,y,z[,w]
//! 1000000,gyro,0.01,0.0,-0.02
//! 1000000,accel,0.1,9.8,0.2
//! 2000000,rotation,0.0,0.0,0.38,0.92
//! ```
//!
//! `kind` is `accel`, `gyro` or `rotation` (long forms `accelerometer`,
//! `gyroscope` and `rotation_vector` are accepted too).

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use nalgebra::Vector3;
use tracing::warn;

use crate::imu::{SensorEvent, SensorReading};

/// Load every event of a sensor log file, in file order.
pub fn load_sensor_log<P: AsRef<Path>>(path: P) -> Result<Vec<SensorEvent>> {
    let path = path.as_ref();
    let rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    parse_records(rdr).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse a sensor log from any reader.
pub fn read_sensor_log<R: Read>(reader: R) -> Result<Vec<SensorEvent>> {
    let rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader);
    parse_records(rdr)
}

fn parse_records<R: Read>(mut rdr: csv::Reader<R>) -> Result<Vec<SensorEvent>> {
    let mut events = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        if rec.len() < 5 {
            warn!(record = line + 1, "Skipping short sensor record");
            continue;
        }

        let timestamp_ns: i64 = rec[0]
            .trim()
            .parse()
            .with_context(|| format!("Bad timestamp in record {}", line + 1))?;
        let xyz = Vector3::new(
            rec[2].trim().parse::<f64>()?,
            rec[3].trim().parse::<f64>()?,
            rec[4].trim().parse::<f64>()?,
        );

        let reading = match rec[1].trim().to_ascii_lowercase().as_str() {
            "accel" | "accelerometer" => SensorReading::Accelerometer(xyz),
            "gyro" | "gyroscope" => SensorReading::Gyroscope(xyz),
            "rotation" | "rotation_vector" => {
                let w = match rec.get(5).map(str::trim) {
                    Some(w) if !w.is_empty() => Some(w.parse::<f64>()?),
                    _ => None,
                };
                SensorReading::RotationVector { xyz, w }
            }
            other => bail!("Unknown sensor kind {:?} in record {}", other, line + 1),
        };

        events.push(SensorEvent {
            timestamp_ns,
            reading,
        });
    }
    Ok(events)
}
