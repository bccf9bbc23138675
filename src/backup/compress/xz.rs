use crate::backup::compress::{Compressor, CompressorBuilder};
use crate::backup::result_error::result::Result;
use liblzma::stream::{Check, MtStreamBuilder};
use liblzma::write::XzEncoder;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::io::Write;
use std::num::NonZero;
use validator::Validate;

static DEFAULT_COMPRESSION_LEVEL: u32 = 6;
static DEFAULT_MAX_PARALLELIZATION: usize = 16;

/// XZ settings for compressed snapshots.
///
/// `level` is the preset (0-9). `thread` defaults to half the available
/// cores; a single thread uses the plain encoder and less memory.
#[skip_serializing_none]
#[derive(Clone, Default, Validate, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct XzConfig {
    #[validate(range(min = 0, max = 9))]
    level: Option<u32>,
    #[validate(range(min = 1))]
    thread: Option<u32>,
}

impl XzConfig {
    fn threads(&self) -> u32 {
        self.thread.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZero::get)
                .map(|core| (core / 2).clamp(1, DEFAULT_MAX_PARALLELIZATION) as u32)
                .unwrap_or(1)
        })
    }
}

impl<W: Write> CompressorBuilder<W> for XzConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        let level = self.level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        let thread = self.threads();
        tracing::debug!("Creating XZ compressor with level={level}, threads={thread}");

        if thread == 1 {
            Ok(XzEncoder::new(writer, level).into())
        } else {
            let stream = MtStreamBuilder::new()
                .preset(level)
                .check(Check::Crc64)
                .threads(thread)
                .encoder()?;
            Ok(XzEncoder::new_stream(writer, stream).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_level_out_of_range() {
        let config = XzConfig {
            level: Some(10),
            thread: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_threads_invalid() {
        let config = XzConfig {
            level: None,
            thread: Some(0),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auto_threads_at_least_one() {
        assert!(XzConfig::default().threads() >= 1);
    }

    #[test]
    fn test_single_and_multi_thread_build() {
        for thread in [1, 4] {
            let config = XzConfig {
                level: Some(1),
                thread: Some(thread),
            };
            match config.build_compressor(Cursor::new(Vec::new())).unwrap() {
                Compressor::XzEncoder(_) => (),
                _ => panic!("Expected XzEncoder"),
            }
        }
    }

    #[test]
    fn test_multi_thread_stream_decodes() {
        use crate::backup::finish::Finish;
        use std::io::Read;

        let config = XzConfig {
            level: Some(1),
            thread: Some(2),
        };
        let mut compressor = config.build_compressor(Cursor::new(Vec::new())).unwrap();
        compressor.write_all(b"multi threaded snapshot").unwrap();
        let compressed = compressor.finish().unwrap().into_inner();

        let mut decoded = String::new();
        liblzma::read::XzDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "multi threaded snapshot");
    }
}
