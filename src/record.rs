//! Converting raw `date,time,temperature,humidity` logs into JSON lines records.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// One measurement of the sensor log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClimateRecord {
    /// Day of the measurement, as written in the log.
    pub date: String,
    /// Time of day of the measurement, as written in the log.
    pub time: String,
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
}

impl ClimateRecord {
    fn from_fields(fields: &StringRecord, line: usize) -> Result<Self> {
        if fields.len() < 4 {
            return Err(Error::Record {
                line,
                reason: format!("expected 4 fields, found {}", fields.len()),
            });
        }
        let number = |i: usize, name: &str| {
            fields[i].parse::<f32>().map_err(|err| Error::Record {
                line,
                reason: format!("{name} {:?}: {err}", &fields[i]),
            })
        };
        Ok(Self {
            date: fields[0].to_string(),
            time: fields[1].to_string(),
            temperature: number(2, "temperature")?,
            humidity: number(3, "humidity")?,
        })
    }
}

/// Write one JSON record per line of `input` to `output` and return how many were written.
///
/// The input has no header. Columns past the fourth are ignored and blank lines are skipped.
///
/// # Errors
///
/// Returns an error naming the line of the first malformed record, or an I/O error.
pub fn convert<R, W>(input: R, output: W) -> Result<usize>
where
    R: Read,
    W: Write,
{
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);
    let mut writer = BufWriter::new(output);
    let mut count = 0;
    for result in reader.records() {
        let fields = result?;
        let line = fields.position().map_or(count + 1, |p| p.line() as usize);
        let record = ClimateRecord::from_fields(&fields, line)?;
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Convert the log at `input` into a JSON lines file at `output`.
///
/// # Errors
///
/// Returns an error if a file can't be opened or a record is malformed.
pub fn convert_file<P, Q>(input: P, output: Q) -> Result<usize>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let (input, output) = (input.as_ref(), output.as_ref());
    let count = convert(
        BufReader::new(File::open(input)?),
        File::create(output)?,
    )?;
    info!(input = %input.display(), output = %output.display(), count, "converted records");
    Ok(count)
}
