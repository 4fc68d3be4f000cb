//! Content negotiation on the download path
//!
//! Unpacking happens in two stages: the [`CompressionUnpacker`] undoes the
//! transfer encoding, then the [`ContentUnpacker`] turns the payload into the
//! final jar (merging a jardiff if needed).

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
#[cfg(test)]
use mockall::automock;
use reqwest::Url;

use crate::downloader::jardiff;
use crate::error::FetchError;
use crate::http::{
    CURRENT_VERSION_ID_PARAM, GZIP_ENCODING, JARDIFF_MIME_TYPE, PACK200_GZIP_ENCODING,
    VERSION_ID_PARAM,
};

const PACK_GZ_SUFFIX: &str = ".pack.gz";
const GZ_SUFFIX: &str = ".gz";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Turns a pack200 stream (already gunzipped) back into a jar
#[cfg_attr(test, automock)]
pub trait Pack200Decoder: Send + Sync {
    fn decode(&self, packed: &[u8]) -> Result<Vec<u8>, FetchError>;
}

/// Accepts payloads that already are zip archives.
///
/// Servers commonly label plain gzipped jars as `pack200-gzip`; a real
/// pack200 stream is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughPack200Decoder;

impl Pack200Decoder for PassthroughPack200Decoder {
    fn decode(&self, packed: &[u8]) -> Result<Vec<u8>, FetchError> {
        if packed.starts_with(ZIP_MAGIC) {
            Ok(packed.to_vec())
        } else {
            Err(FetchError::UnsupportedEncoding(
                PACK200_GZIP_ENCODING.to_string(),
            ))
        }
    }
}

/// Transfer encoding of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionUnpacker {
    None,
    Gzip,
    Pack200Gzip,
}

impl CompressionUnpacker {
    /// Picks the unpacker from the `Content-Encoding` header or the URL.
    ///
    /// pack200 is checked first: a pack200 stream also looks gzipped, and
    /// gunzipping it alone would yield a pack archive instead of a jar.
    pub fn select(content_encoding: Option<&str>, url: &Url) -> Self {
        let encoding = content_encoding.map(|e| e.trim().to_ascii_lowercase());
        let path = url.path();

        if encoding.as_deref() == Some(PACK200_GZIP_ENCODING) || path.ends_with(PACK_GZ_SUFFIX) {
            CompressionUnpacker::Pack200Gzip
        } else if encoding.as_deref() == Some(GZIP_ENCODING) || path.ends_with(GZ_SUFFIX) {
            CompressionUnpacker::Gzip
        } else {
            CompressionUnpacker::None
        }
    }

    pub fn unpack<'a, R: Read + 'a>(
        self,
        input: R,
        pack200: &dyn Pack200Decoder,
    ) -> Result<Box<dyn Read + 'a>, FetchError> {
        match self {
            CompressionUnpacker::None => Ok(Box::new(input)),
            CompressionUnpacker::Gzip => Ok(Box::new(GzDecoder::new(input))),
            CompressionUnpacker::Pack200Gzip => {
                let mut packed = Vec::new();
                GzDecoder::new(input).read_to_end(&mut packed)?;
                Ok(Box::new(Cursor::new(pack200.decode(&packed)?)))
            }
        }
    }
}

/// Payload type of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentUnpacker {
    Passthrough,
    JarDiff,
}

impl ContentUnpacker {
    /// A jardiff is only accepted for requests that named both the current
    /// and the target version
    pub fn select(content_type: Option<&str>, url: &Url) -> Self {
        let is_jardiff = content_type
            .and_then(|t| t.split(';').next())
            .is_some_and(|t| t.trim().eq_ignore_ascii_case(JARDIFF_MIME_TYPE));

        if is_jardiff
            && query_param(url, VERSION_ID_PARAM).is_some()
            && query_param(url, CURRENT_VERSION_ID_PARAM).is_some()
        {
            ContentUnpacker::JarDiff
        } else {
            ContentUnpacker::Passthrough
        }
    }

    /// Produces the final content. `base_jar` is the cached jar a jardiff
    /// applies to.
    pub fn unpack<'a, R: Read + 'a>(
        self,
        mut input: R,
        base_jar: Option<&Path>,
    ) -> Result<Box<dyn Read + 'a>, FetchError> {
        match self {
            ContentUnpacker::Passthrough => Ok(Box::new(input)),
            ContentUnpacker::JarDiff => {
                let base_jar = base_jar.ok_or_else(|| {
                    FetchError::JarDiff("no cached jar to apply the diff to".to_string())
                })?;
                let mut diff = Vec::new();
                input.read_to_end(&mut diff)?;

                let mut merged = jardiff::merge(
                    File::open(base_jar)?,
                    Cursor::new(diff),
                    Cursor::new(Vec::new()),
                )?;
                merged.set_position(0);
                Ok(Box::new(merged))
            }
        }
    }
}

/// First value of the query parameter `name`
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Counts the bytes read through it
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.count += read as u64;
        Ok(read)
    }
}
