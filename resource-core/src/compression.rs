/*!
Compression adapters for resource files.

Resource files are plain text by default. Large payloads can be stored
gzip-compressed instead; the provenance header travels inside the compressed
stream, so decompressing a file always yields the readable layout.
*/

use crate::{ResourceError, Result};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::Arc;

/// Compression abstraction for resource file content
pub trait CompressionAdapter: Send + Sync {
    /// Compress the rendered file content
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress stored bytes back into the rendered file content
    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of the compression algorithm
    fn algorithm_name(&self) -> &str;
}

/// Compression selected through configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// Store the readable file as-is
    #[default]
    None,
    /// Gzip the whole file
    Gzip,
}

impl CompressionKind {
    /// Build the adapter for this kind
    pub fn adapter(self) -> Arc<dyn CompressionAdapter> {
        match self {
            CompressionKind::None => Arc::new(NoCompression::new()),
            CompressionKind::Gzip => Arc::new(GzipCompressor::new()),
        }
    }

    /// Parse a configuration value (`none`, `gzip`)
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(CompressionKind::None),
            "gzip" | "gz" => Ok(CompressionKind::Gzip),
            other => Err(ResourceError::validation(format!(
                "Unknown compression '{other}', expected 'none' or 'gzip'"
            ))),
        }
    }
}

/// Gzip compression adapter
///
/// # Example
/// ```rust
/// use resource_core::{CompressionAdapter, GzipCompressor};
///
/// let compressor = GzipCompressor::new();
/// let data = b"# generated resource file";
/// let compressed = compressor.compress(data)?;
/// let decompressed = compressor.decompress(&compressed)?;
/// assert_eq!(data, &decompressed[..]);
/// # Ok::<(), resource_core::ResourceError>(())
/// ```
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    compression_level: Compression,
}

impl GzipCompressor {
    /// Create a new gzip compressor with default compression level (6)
    pub fn new() -> Self {
        Self {
            compression_level: Compression::default(),
        }
    }

    /// Create a new gzip compressor with the specified compression level (0-9)
    pub fn with_level(level: u32) -> Self {
        Self {
            compression_level: Compression::new(level),
        }
    }

    /// Create a compressor for fast compression (level 1)
    pub fn fast() -> Self {
        Self::with_level(1)
    }

    /// Create a compressor for maximum compression (level 9)
    pub fn max() -> Self {
        Self::with_level(9)
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAdapter for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.compression_level);

        encoder.write_all(data).map_err(|e| {
            ResourceError::compression(format!("Failed to write data for compression: {e}"))
        })?;

        encoder
            .finish()
            .map_err(|e| ResourceError::compression(format!("Failed to finish compression: {e}")))
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed_data);
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| ResourceError::compression(format!("Failed to decompress data: {e}")))?;

        Ok(decompressed)
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Pass-through adapter used for plain-text resource files
#[derive(Debug, Clone, Default)]
pub struct NoCompression;

impl NoCompression {
    pub fn new() -> Self {
        Self
    }
}

impl CompressionAdapter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed_data.to_vec())
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}
