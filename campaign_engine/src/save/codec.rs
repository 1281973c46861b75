//! Payload encodings and the envelope checksum.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

/// Turns serialized state bytes into stored bytes and back.
pub trait SaveCodec {
    /// Recorded in the envelope metadata so a mismatched decoder is caught early.
    fn name(&self) -> &'static str;
    fn encode(&self, raw: &[u8]) -> io::Result<Vec<u8>>;
    fn decode(&self, encoded: &[u8]) -> io::Result<Vec<u8>>;
}

/// zlib compression. The default codec.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCodec {
    level: Compression,
}

impl DeflateCodec {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl SaveCodec for DeflateCodec {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn encode(&self, raw: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(raw)?;
        encoder.finish()
    }

    fn decode(&self, encoded: &[u8]) -> io::Result<Vec<u8>> {
        let mut raw = Vec::new();
        ZlibDecoder::new(encoded).read_to_end(&mut raw)?;
        Ok(raw)
    }
}

/// Stores the serialized state as-is. Handy when inspecting saves by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl SaveCodec for PlainCodec {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn encode(&self, raw: &[u8]) -> io::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decode(&self, encoded: &[u8]) -> io::Result<Vec<u8>> {
        Ok(encoded.to_vec())
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
