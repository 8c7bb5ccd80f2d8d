use crate::error::{IngestError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Persists `value` as a MessagePack artifact.
pub fn save_binary<P: AsRef<Path>, T: Serialize + ?Sized>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let serialization_error = |message: String| IngestError::Serialization {
        path: path.display().to_string(),
        message,
    };

    let file = File::create(path).map_err(|e| serialization_error(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    rmp_serde::encode::write_named(&mut writer, value)
        .map_err(|e| serialization_error(e.to_string()))?;
    writer
        .flush()
        .map_err(|e| serialization_error(e.to_string()))?;

    info!(path = %path.display(), "binary file saved");
    Ok(())
}

/// Loads an artifact written by [`save_binary`].
pub fn load_binary<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
    let path = path.as_ref();
    let serialization_error = |message: String| IngestError::Serialization {
        path: path.display().to_string(),
        message,
    };

    let file = File::open(path).map_err(|e| serialization_error(e.to_string()))?;
    let value = rmp_serde::decode::from_read(BufReader::new(file))
        .map_err(|e| serialization_error(e.to_string()))?;

    info!(path = %path.display(), "binary file loaded");
    Ok(value)
}

/// Reads a file and returns its bytes as standard padded base64.
pub fn encode_image_base64<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| IngestError::Encoding {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let encoded = STANDARD.encode(bytes);
    info!(path = %path.display(), "image encoded into base64");
    Ok(encoded)
}

/// Decodes base64 text and writes the bytes to `path`.
///
/// Invalid text is rejected before the output file is created.
pub fn decode_image_base64<P: AsRef<Path>>(data: &str, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| IngestError::Encoding {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    fs::write(path, bytes).map_err(|e| IngestError::file_access(path, e))?;
    info!(path = %path.display(), "image decoded and saved");
    Ok(())
}

/// File size in whole kilobytes, e.g. `"12 KB"`.
pub fn file_size_kb<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).map_err(|e| IngestError::file_access(path, e))?;
    let size = format_kb(metadata.len());
    info!(path = %path.display(), size = %size, "file size");
    Ok(size)
}

pub(crate) fn format_kb(bytes: u64) -> String {
    format!("{} KB", (bytes as f64 / 1024.0).round_ties_even() as u64)
}

/// Creates every directory in `paths`, parents included.
pub fn create_directories<I, P>(paths: I) -> Result<()>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    for path in paths {
        let path = path.as_ref();
        fs::create_dir_all(path).map_err(|e| IngestError::file_access(path, e))?;
        info!(path = %path.display(), "created directory");
    }
    Ok(())
}
