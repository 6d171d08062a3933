//! Stream decoders for the structural streams a form template may use.
//!
//! Cross-reference streams and object streams are almost always
//! FlateDecode-compressed, usually with a PNG "Up" predictor. Those are the
//! only encodings understood here; form dictionaries never live in content
//! streams, so image and text filters are out of reach by construction.

use crate::error::{Error, Result};

mod flate;
mod predictor;

pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Upper bound on decoded size for a single stream.
const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

fn decoder_for(filter_name: &str) -> Result<Box<dyn StreamDecoder>> {
    match filter_name {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder)),
        other => Err(Error::UnsupportedFilter(other.to_string())),
    }
}

/// Decode stream data through a filter pipeline, then undo any predictor.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder = decoder_for(filter_name)?;
        current = decoder.decode(&current)?;

        if current.len() > MAX_DECOMPRESSED_SIZE {
            return Err(Error::Decode(format!(
                "{} output of {} bytes exceeds limit of {} bytes",
                decoder.name(),
                current.len(),
                MAX_DECOMPRESSED_SIZE
            )));
        }
    }

    if let Some(params) = params {
        if params.predictor != 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}

/// Decode stream data without decode parameters.
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_params(data, filters, None)
}
