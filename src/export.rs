//! Saving a trained forecaster as a compact artifact and loading it back.
//!
//! Every weight and bias is quantized to IEEE 754 half precision. The model description is
//! serialized as JSON and compressed with zlib, so the artifact size is the figure that matters
//! when the forecaster has to fit on a small device.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{Error, Result},
    model::{Activation, Forecaster, Layer},
    normalize::Statistics,
    window::WindowShape,
};

/// Version written into every artifact.
pub const FORMAT_VERSION: u32 = 1;

/// Round a value to the nearest half-precision float and return its bits.
///
/// Values too large for half precision become infinities and values too small become zeros.
pub fn quantize(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;
    if exponent == 0xff {
        let nan = if mantissa != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }
    // Rebias from 127 to 15.
    let e = exponent - 112;
    if e >= 0x1f {
        return sign | 0x7c00;
    }
    if e <= 0 {
        if e < -10 {
            return sign;
        }
        let m = mantissa | 0x0080_0000;
        let shift = (14 - e) as u32;
        let round = (m >> (shift - 1)) & 1;
        return sign | ((m >> shift) + round) as u16;
    }
    let half = ((e as u32) << 10) | (mantissa >> 13);
    let round = (mantissa >> 12) & 1;
    sign | (half + round) as u16
}

/// Expand the bits of a half-precision float.
pub fn dequantize(bits: u16) -> f32 {
    let sign = u32::from(bits & 0x8000) << 16;
    let exponent = u32::from((bits >> 10) & 0x1f);
    let mantissa = u32::from(bits & 0x03ff);
    match exponent {
        0 => {
            let magnitude = mantissa as f32 * 2f32.powi(-24);
            if sign == 0 {
                magnitude
            } else {
                -magnitude
            }
        }
        0x1f => f32::from_bits(sign | 0x7f80_0000 | (mantissa << 13)),
        _ => f32::from_bits(sign | ((exponent + 112) << 23) | (mantissa << 13)),
    }
}

/// The quantized parameters of one dense layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportedLayer {
    /// Nonlinearity of the layer.
    pub activation: Activation,
    /// Inputs of each neuron.
    pub input_size: usize,
    /// Number of neurons.
    pub output_size: usize,
    /// Half-precision weights, neuron after neuron.
    pub weights: Vec<u16>,
    /// Half-precision biases.
    pub biases: Vec<u16>,
}

/// Everything needed to forecast from raw measurements: the window shape, the normalization
/// statistics of the training split and the quantized network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportedModel {
    /// Artifact format version.
    pub version: u32,
    /// Steps given to the model.
    pub input_width: usize,
    /// Steps forecast by the model.
    pub output_width: usize,
    /// Channels per step.
    pub channels: usize,
    /// Statistics used to standardize inputs.
    pub statistics: Statistics,
    /// Layers, from input to output.
    pub layers: Vec<ExportedLayer>,
}

impl ExportedModel {
    /// Quantize a forecaster together with its normalization statistics.
    pub fn new(forecaster: &Forecaster<'_>, statistics: &Statistics) -> Self {
        let shape = forecaster.shape();
        let layers = forecaster
            .layers()
            .iter()
            .map(|layer| ExportedLayer {
                activation: layer.activation(),
                input_size: layer.input_size(),
                output_size: layer.output_size(),
                weights: layer.weights().iter().map(|w| quantize(*w as f32)).collect(),
                biases: layer.biases().iter().map(|b| quantize(*b as f32)).collect(),
            })
            .collect();
        Self {
            version: FORMAT_VERSION,
            input_width: shape.input_width,
            output_width: shape.output_width,
            channels: forecaster.channels(),
            statistics: statistics.clone(),
            layers,
        }
    }

    /// The window shape the model forecasts.
    pub fn shape(&self) -> WindowShape {
        WindowShape {
            input_width: self.input_width,
            output_width: self.output_width,
        }
    }

    /// Rebuild a forecaster from the dequantized parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the version is unknown or the layers don't describe a valid network.
    pub fn forecaster<'a>(&self) -> Result<Forecaster<'a>> {
        if self.version != FORMAT_VERSION {
            return Err(Error::ModelFormat(format!(
                "version {} (expected {FORMAT_VERSION})",
                self.version
            )));
        }
        if self.statistics.channels() != self.channels
            || self.statistics.std().len() != self.channels
        {
            return Err(Error::DimensionMismatch {
                expected: self.channels,
                actual: self.statistics.channels(),
            });
        }
        let layers = self
            .layers
            .iter()
            .map(|layer| {
                if layer.biases.len() != layer.output_size {
                    return Err(Error::ElementCount {
                        expected: layer.output_size,
                        actual: layer.biases.len(),
                    });
                }
                let weights: Vec<_> = layer
                    .weights
                    .iter()
                    .map(|w| f64::from(dequantize(*w)))
                    .collect();
                let biases: Vec<_> = layer
                    .biases
                    .iter()
                    .map(|b| f64::from(dequantize(*b)))
                    .collect();
                Layer::from_parts(layer.input_size, &weights, &biases, layer.activation)
            })
            .collect::<Result<Vec<_>>>()?;
        Forecaster::from_layers(self.shape(), self.channels, layers)
    }

    /// Write the compressed artifact and return its size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serializing or writing fails.
    pub fn write<W>(&self, mut writer: W) -> Result<u64>
    where
        W: Write,
    {
        let json = serde_json::to_vec(self)?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&json)?;
        let compressed = encoder.finish()?;
        writer.write_all(&compressed)?;
        writer.flush()?;
        Ok(compressed.len() as u64)
    }

    /// Read a compressed artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the data isn't a zlib stream holding a model description.
    pub fn read<R>(reader: R) -> Result<Self>
    where
        R: Read,
    {
        let model: Self = serde_json::from_reader(ZlibDecoder::new(reader))?;
        if model.version != FORMAT_VERSION {
            return Err(Error::ModelFormat(format!(
                "version {} (expected {FORMAT_VERSION})",
                model.version
            )));
        }
        Ok(model)
    }
}

/// Save a forecaster and its statistics to `path`, returning the artifact size in bytes.
///
/// # Errors
///
/// Returns an error if the file can't be written.
pub fn export<P>(path: P, forecaster: &Forecaster<'_>, statistics: &Statistics) -> Result<u64>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let model = ExportedModel::new(forecaster, statistics);
    let size = model.write(BufWriter::new(File::create(path)?))?;
    info!(path = %path.display(), size, "exported model");
    Ok(size)
}

/// Load an artifact written by [`export`].
///
/// # Errors
///
/// Returns an error if the file can't be read or doesn't hold a model.
pub fn load<P>(path: P) -> Result<ExportedModel>
where
    P: AsRef<Path>,
{
    ExportedModel::read(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_known_values() {
        assert_eq!(quantize(0.0), 0x0000);
        assert_eq!(quantize(-0.0), 0x8000);
        assert_eq!(quantize(1.0), 0x3c00);
        assert_eq!(quantize(-2.0), 0xc000);
        assert_eq!(quantize(65504.0), 0x7bff);
        assert_eq!(quantize(1e6), 0x7c00);
        assert_eq!(quantize(f32::NEG_INFINITY), 0xfc00);
        assert_eq!(quantize(2f32.powi(-24)), 0x0001);
        assert_eq!(quantize(1e-10), 0x0000);
        assert!(dequantize(quantize(f32::NAN)).is_nan());
    }

    #[test]
    fn dequantize_known_values() {
        assert_eq!(dequantize(0x3c00), 1.0);
        assert_eq!(dequantize(0x3555), 0.333_251_95);
        assert_eq!(dequantize(0x0001), 2f32.powi(-24));
        assert_eq!(dequantize(0x8001), -(2f32.powi(-24)));
        assert_eq!(dequantize(0x7c00), f32::INFINITY);
    }

    #[test]
    fn quantization_error_is_bounded() {
        for i in -1000..1000 {
            let x = i as f32 * 0.0137;
            let y = dequantize(quantize(x));
            assert!((x - y).abs() <= x.abs() * 2f32.powi(-11) + 1e-7, "{x} -> {y}");
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(ExportedModel::read(&b"not a model"[..]).is_err());
    }
}
