//! FlateDecode (zlib/deflate) implementation.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(input);
        let mut output = Vec::new();

        match decoder.read_to_end(&mut output) {
            Ok(_) => Ok(output),
            Err(e) => {
                if !output.is_empty() {
                    log::warn!(
                        "FlateDecode partial recovery: extracted {} bytes before corruption: {}",
                        output.len(),
                        e
                    );
                    return Ok(output);
                }

                // Some writers emit raw deflate without the zlib wrapper
                log::debug!("Zlib decode failed, trying raw deflate");
                output.clear();
                let mut deflate_decoder = DeflateDecoder::new(input);
                match deflate_decoder.read_to_end(&mut output) {
                    Ok(_) if !output.is_empty() => Ok(output),
                    Ok(_) => Err(Error::Decode(format!("FlateDecode failed: {}", e))),
                    Err(deflate_err) => {
                        if !output.is_empty() {
                            log::warn!(
                                "Raw deflate partial recovery: extracted {} bytes before error",
                                output.len()
                            );
                            return Ok(output);
                        }
                        Err(Error::Decode(format!(
                            "FlateDecode failed. Zlib error: {}, Deflate error: {}. Compressed size: {} bytes.",
                            e,
                            deflate_err,
                            input.len()
                        )))
                    },
                }
            },
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}
