pub mod xz;

use crate::backup::finish::Finish;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithDebugObjectAndFnName;
use derive_more::From;
use io_enum::Write;
use liblzma::write::XzEncoder;
use serde::{Deserialize, Serialize};
use std::io;
use std::io::Write;
use std::result;
use validator::{Validate, ValidationErrors};

#[derive(Write, From)]
pub enum Compressor<W: Write> {
    None(W),
    XzEncoder(XzEncoder<W>),
}

/// Compression applied to the tar stream of a compressed snapshot.
#[derive(Clone, From, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "compressor_type")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum CompressorConfig {
    None,
    Xz(xz::XzConfig),
}

impl Default for CompressorConfig {
    fn default() -> Self {
        CompressorConfig::Xz(xz::XzConfig::default())
    }
}

impl Validate for CompressorConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            CompressorConfig::None => Ok(()),
            CompressorConfig::Xz(xz) => xz.validate(),
        }
    }
}

pub trait CompressorBuilder<W: Write> {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>>;
}

impl<W: Write> Finish<W> for Compressor<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Compressor::None(w) => Ok(w),
            Compressor::XzEncoder(w) => Finish::finish(w),
        }
    }
}

impl<W: Write> CompressorBuilder<W> for CompressorConfig {
    fn build_compressor(&self, writer: W) -> Result<Compressor<W>> {
        match self {
            CompressorConfig::None => Ok(Compressor::None(writer)),
            CompressorConfig::Xz(xz) => xz.build_compressor(writer),
        }
        .with_debug_object_and_fn_name(self.clone(), "build_compressor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    #[test]
    fn test_default_is_xz() {
        assert_eq!(
            CompressorConfig::default(),
            CompressorConfig::Xz(xz::XzConfig::default())
        );
    }

    #[test]
    fn test_deserialize_tagged() {
        let none: CompressorConfig =
            serde_json::from_str(r#"{"compressor_type": "none"}"#).unwrap();
        assert_eq!(none, CompressorConfig::None);
        let xz: CompressorConfig =
            serde_json::from_str(r#"{"compressor_type": "xz", "level": 6}"#).unwrap();
        assert!(matches!(xz, CompressorConfig::Xz(_)));
        assert!(serde_json::from_str::<CompressorConfig>(r#"{"compressor_type": "lz4"}"#).is_err());
    }

    #[test]
    fn test_none_passes_through() {
        let mut compressor = CompressorConfig::None
            .build_compressor(Cursor::new(Vec::new()))
            .unwrap();
        compressor.write_all(b"plain").unwrap();
        assert_eq!(compressor.finish().unwrap().into_inner(), b"plain");
    }

    #[test]
    fn test_xz_round_trip() {
        let mut compressor = CompressorConfig::default()
            .build_compressor(Cursor::new(Vec::new()))
            .unwrap();
        compressor.write_all(b"snapshot bytes").unwrap();
        let compressed = compressor.finish().unwrap().into_inner();

        let mut decoded = String::new();
        liblzma::read::XzDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "snapshot bytes");
    }
}
