use std::io::{BufReader, Read};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzma,
    Lz4,
    Lz4Hc,
    Lzham,
}

impl Compression {
    pub const MASK: u32 = 0x3F;

    /// Extracts the compression kind from a header or block flag.
    pub fn from_flag(flag: u32) -> Result<Compression> {
        Ok(match flag & Self::MASK {
            0 => Compression::None,
            1 => Compression::Lzma,
            2 => Compression::Lz4,
            3 => Compression::Lz4Hc,
            4 => Compression::Lzham,
            other => return Err(Error::UnknownCompression(other)),
        })
    }
}

/// Reads the compressed stream to its end and returns exactly `expected_size` decompressed bytes.
pub fn decompress(
    reader: &mut impl Read,
    compression: Compression,
    expected_size: usize,
) -> Result<Vec<u8>> {
    let output = match compression {
        Compression::None => {
            let mut output = Vec::with_capacity(expected_size);
            reader
                .by_ref()
                .take(expected_size as u64)
                .read_to_end(&mut output)?;
            output
        }
        Compression::Lz4 | Compression::Lz4Hc => {
            let mut input = Vec::new();
            reader.read_to_end(&mut input)?;
            lz4_flex::block::decompress(&input, expected_size).map_err(|e| Error::Decompress {
                kind: compression,
                message: e.to_string(),
            })?
        }
        Compression::Lzma => {
            use lzma_rs::decompress::{Options, UnpackedSize};

            let mut output = Vec::with_capacity(expected_size);
            lzma_rs::lzma_decompress_with_options(
                &mut BufReader::new(reader),
                &mut output,
                &Options {
                    unpacked_size: UnpackedSize::UseProvided(Some(expected_size as u64)),
                    ..Default::default()
                },
            )
            .map_err(|e| Error::Decompress {
                kind: compression,
                message: format!("{e:?}"),
            })?;
            output
        }
        Compression::Lzham => return Err(Error::UnsupportedCompression(compression)),
    };

    if output.len() != expected_size {
        return Err(Error::DecompressionShortfall {
            expected: expected_size as u64,
            actual: output.len() as u64,
        });
    }
    Ok(output)
}
