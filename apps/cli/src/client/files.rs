//! Local image files to and from data URLs.

use std::fs;
use std::path::{Path, PathBuf};

use markup_abstraction::DataUrl;

use super::ClientError;

/// Reads an image file into a data URL, taking the MIME type from the
/// file extension.
pub fn read_image(path: &Path) -> Result<String, ClientError> {
    let mime = mime_guess::from_path(path)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        .ok_or_else(|| {
            ClientError::InvalidImage(format!("{} is not a recognized image file", path.display()))
        })?;
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Err(ClientError::InvalidImage(format!("{} is empty", path.display())));
    }
    Ok(DataUrl::from_bytes(mime.essence_str(), &bytes).to_string())
}

/// Decodes a data URL and writes the image bytes to `path`.
pub fn write_image(path: &Path, data_url: &str) -> Result<(), ClientError> {
    let image =
        DataUrl::parse_image(data_url).map_err(|e| ClientError::InvalidImage(e.to_string()))?;
    let bytes = image.decode().map_err(|e| ClientError::InvalidImage(e.to_string()))?;
    fs::write(path, bytes)?;
    Ok(())
}

/// `<stem>-edited.<ext>` next to the input, with the extension taken from
/// the result's MIME type.
pub fn default_output_path(input: &Path, data_url: &str) -> PathBuf {
    let extension = match DataUrl::parse_image(data_url) {
        Ok(image) if image.mime_type() == "image/jpeg" => "jpg",
        Ok(image) => mime_guess::get_mime_extensions_str(image.mime_type())
            .and_then(|exts| exts.first().copied())
            .unwrap_or("png"),
        Err(_) => "png",
    };
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    input.with_file_name(format!("{stem}-edited.{extension}"))
}
