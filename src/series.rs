//! Multichannel time series and their train/validation/test splits.

use std::{fs::File, io, ops::Range, path::Path, sync::Arc};

use tracing::debug;

use crate::error::{Error, Result};

/// An ordered sequence of fixed-size vectors, one vector per time step.
///
/// Values are stored row-major, so the vector at step `t` occupies
/// `values[t * channels..(t + 1) * channels]`. The buffer is shared, so slicing a series into
/// splits never copies data.
#[derive(Clone, Debug)]
pub struct Series {
    channels: usize,
    values: Arc<[f32]>,
    steps: Range<usize>,
}

impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.channels == other.channels && self.rows(0..self.len()) == other.rows(0..other.len())
    }
}

impl Series {
    /// Create a series from a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if `channels` is zero or doesn't divide the number of values.
    pub fn new(channels: usize, values: Vec<f32>) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidConfig("a series needs at least one channel".into()));
        }
        if values.len() % channels != 0 {
            return Err(Error::DimensionMismatch {
                expected: channels,
                actual: values.len() % channels,
            });
        }
        let len = values.len() / channels;
        Ok(Self {
            channels,
            values: Arc::from(values),
            steps: 0..len,
        })
    }

    /// Create a series from rows, checking that every row has the same dimensionality.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows are empty-dimensional or don't all have the length of the
    /// first row.
    pub fn from_rows<R>(rows: &[R]) -> Result<Self>
    where
        R: AsRef<[f32]>,
    {
        let channels = rows.first().map_or(0, |row| row.as_ref().len());
        let mut values = Vec::with_capacity(rows.len() * channels);
        for row in rows {
            let row = row.as_ref();
            if row.len() != channels {
                return Err(Error::DimensionMismatch {
                    expected: channels,
                    actual: row.len(),
                });
            }
            values.extend_from_slice(row);
        }
        if channels == 0 {
            return Err(Error::InvalidConfig("a series needs at least one channel".into()));
        }
        Self::new(channels, values)
    }

    /// Number of values per time step.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of time steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if the series holds no time step.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The vector at time step `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t` is out of bounds.
    pub fn row(&self, t: usize) -> &[f32] {
        assert!(t < self.len(), "step {t} out of bounds for length {}", self.len());
        let start = (self.steps.start + t) * self.channels;
        &self.values[start..start + self.channels]
    }

    /// The flat row-major values of the steps in `range`.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    pub fn rows(&self, range: Range<usize>) -> &[f32] {
        assert!(
            range.start <= range.end && range.end <= self.len(),
            "steps {range:?} out of bounds for length {}",
            self.len()
        );
        let start = (self.steps.start + range.start) * self.channels;
        let end = (self.steps.start + range.end) * self.channels;
        &self.values[start..end]
    }

    /// Iterate over the time steps in order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.rows(0..self.len()).chunks_exact(self.channels)
    }

    /// A contiguous sub-range of the series sharing the same buffer.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        assert!(
            range.start <= range.end && range.end <= self.len(),
            "steps {range:?} out of bounds for length {}",
            self.len()
        );
        Self {
            channels: self.channels,
            values: Arc::clone(&self.values),
            steps: self.steps.start + range.start..self.steps.start + range.end,
        }
    }

    /// Split the series into contiguous train, validation and test ranges.
    ///
    /// The boundaries are `floor(n * ratios.train_end)` and `floor(n * ratios.validation_end)`;
    /// the test split takes the rest.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundaries are not ordered fractions of the series.
    pub fn split(&self, ratios: SplitRatios) -> Result<Splits> {
        ratios.validate()?;
        let n = self.len();
        let train_end = (n as f64 * ratios.train_end).floor() as usize;
        let validation_end = (n as f64 * ratios.validation_end).floor() as usize;
        debug!(
            total = n,
            train = train_end,
            validation = validation_end - train_end,
            test = n - validation_end,
            "split series"
        );
        Ok(Splits {
            train: self.slice(0..train_end),
            validation: self.slice(train_end..validation_end),
            test: self.slice(validation_end..n),
        })
    }
}

/// Where the train and validation splits end, as fractions of the series length.
/// The test split takes whatever follows `validation_end`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitRatios {
    /// End of the train split.
    pub train_end: f64,
    /// End of the validation split.
    pub validation_end: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train_end: 0.7,
            validation_end: 0.9,
        }
    }
}

impl SplitRatios {
    /// Check that the boundaries describe a partition of the series.
    ///
    /// # Errors
    ///
    /// Returns an error unless `0 <= train_end <= validation_end <= 1`.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=self.validation_end).contains(&self.train_end) || !(self.validation_end <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "split boundaries {} and {} must satisfy 0 <= train <= validation <= 1",
                self.train_end, self.validation_end
            )));
        }
        Ok(())
    }
}

/// The 3 disjoint contiguous ranges of a series.
#[derive(Clone, Debug)]
pub struct Splits {
    /// The leading steps, used to fit normalization statistics and the model.
    pub train: Series,
    /// The steps following the train split.
    pub validation: Series,
    /// The trailing steps.
    pub test: Series,
}

/// Read a series from CSV text with a header row, keeping only the named columns in order.
///
/// # Errors
///
/// Returns an error if a column is missing, a cell can't be parsed as a number, or reading fails.
pub fn read_csv<R>(reader: R, columns: &[&str]) -> Result<Series>
where
    R: io::Read,
{
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let indices = columns
        .iter()
        .map(|&name| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| Error::MissingColumn(name.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        for &idx in &indices {
            let cell = record.get(idx).unwrap_or_default().trim();
            let value = cell.parse::<f32>().map_err(|err| Error::Record {
                // Header is line 1.
                line: row + 2,
                reason: format!("column {}: {cell:?}: {err}", headers.get(idx).unwrap_or_default()),
            })?;
            values.push(value);
        }
    }
    Series::new(columns.len(), values)
}

/// Read a series from a CSV file. See [`read_csv`].
///
/// # Errors
///
/// Returns an error if the file can't be opened or [`read_csv`] fails.
pub fn load_csv<P>(path: P, columns: &[&str]) -> Result<Series>
where
    P: AsRef<Path>,
{
    let file = File::open(path)?;
    let series = read_csv(io::BufReader::new(file), columns)?;
    debug!(steps = series.len(), channels = series.channels(), "loaded series");
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Series {
        let values = (0..n).flat_map(|i| [i as f32, -(i as f32)]).collect();
        Series::new(2, values).unwrap()
    }

    #[test]
    fn rows_must_share_dimension() {
        let err = Series::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert!(Series::new(2, vec![1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn default_split_boundaries() {
        let splits = ramp(10).split(SplitRatios::default()).unwrap();
        assert_eq!(splits.train.len(), 7);
        assert_eq!(splits.validation.len(), 2);
        assert_eq!(splits.test.len(), 1);
        assert_eq!(splits.validation.row(0), &[7.0, -7.0]);
        assert_eq!(splits.test.row(0), &[9.0, -9.0]);
    }

    #[test]
    fn splits_cover_series_in_order() {
        for n in [0, 1, 3, 11, 57, 100] {
            let series = ramp(n);
            let splits = series.split(SplitRatios::default()).unwrap();
            let joined: Vec<f32> = [&splits.train, &splits.validation, &splits.test]
                .iter()
                .flat_map(|s| s.rows(0..s.len()).to_vec())
                .collect();
            assert_eq!(joined, series.rows(0..n));
        }
    }

    #[test]
    fn invalid_ratios() {
        let ratios = SplitRatios {
            train_end: 0.8,
            validation_end: 0.7,
        };
        assert!(ramp(5).split(ratios).is_err());
        let ratios = SplitRatios {
            train_end: f64::NAN,
            validation_end: 0.9,
        };
        assert!(ramp(5).split(ratios).is_err());
    }

    #[test]
    fn csv_columns_by_name() {
        let text = "Date Time,p (mbar),T (degC),rh (%)\n\
                    01.01.2009 00:10:00,996.52,-8.02,93.3\n\
                    01.01.2009 00:20:00,996.57,-8.41,93.4\n";
        let series = read_csv(text.as_bytes(), &["T (degC)", "rh (%)"]).unwrap();
        assert_eq!(series.channels(), 2);
        assert_eq!(series.len(), 2);
        assert_eq!(series.row(1), &[-8.41, 93.4]);

        let err = read_csv(text.as_bytes(), &["wv (m/s)"]).unwrap_err();
        assert!(matches!(err, Error::MissingColumn(name) if name == "wv (m/s)"));
    }
}
