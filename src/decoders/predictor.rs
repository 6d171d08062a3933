//! Predictor reversal for decoded stream data.
//!
//! Cross-reference streams are routinely written with PNG predictor 12 (Up)
//! and `/Columns` equal to the sum of the `/W` widths.

use crate::error::{Error, Result};

/// Decode parameters for stream decoders.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (width in samples)
    pub columns: usize,
    /// Number of color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Bytes of sample data per row, without the PNG tag byte.
    pub fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Bytes per row as stored, including the PNG tag byte for predictors >= 10.
    pub fn bytes_per_row(&self) -> usize {
        let pixel_bytes = self.pixel_bytes_per_row();
        if self.predictor >= 10 {
            pixel_bytes + 1
        } else {
            pixel_bytes
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse the predictor named in `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff_predictor(data, params),
        10..=15 => decode_png_predictor(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

fn decode_tiff_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.pixel_bytes_per_row();
    let bpp = params.bytes_per_pixel();
    if row_len == 0 || data.len() % row_len != 0 {
        return Err(Error::Decode(format!(
            "Data length {} is not a multiple of row size {}",
            data.len(),
            row_len
        )));
    }

    let mut output = Vec::with_capacity(data.len());
    for row in data.chunks(row_len) {
        let start = output.len();
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= bpp { output[start + i - bpp] } else { 0 };
            output.push(byte.wrapping_add(left));
        }
    }
    Ok(output)
}

fn decode_png_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.bytes_per_row();
    let pixel_bytes = params.pixel_bytes_per_row();
    let bpp = params.bytes_per_pixel();

    if data.len() % row_len != 0 {
        return Err(Error::Decode(format!(
            "Data length {} is not a multiple of row size {}",
            data.len(),
            row_len
        )));
    }

    let row_count = data.len() / row_len;
    let mut output = Vec::with_capacity(row_count * pixel_bytes);
    let mut prior = vec![0u8; pixel_bytes];

    for row in data.chunks(row_len) {
        let tag = row[0];
        let encoded = &row[1..];
        let start = output.len();

        for (i, &byte) in encoded.iter().enumerate() {
            let left = if i >= bpp { output[start + i - bpp] } else { 0 };
            let up = prior[i];
            let up_left = if i >= bpp { prior[i - bpp] } else { 0 };

            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", other)))
                },
            };
            output.push(byte.wrapping_add(predicted));
        }

        prior.copy_from_slice(&output[start..start + pixel_bytes]);
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a16, b16, c16) = (a as i16, b as i16, c as i16);
    let p = a16 + b16 - c16;
    let pa = (p - a16).abs();
    let pb = (p - b16).abs();
    let pc = (p - c16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
