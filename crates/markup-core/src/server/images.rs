//! Operator logging for image inputs.

use std::io::Cursor;

use image::ImageReader;
use markup_abstraction::{CallOptions, ContentPart, DataUrl};
use tracing::{info, warn};

/// Pixel dimensions read from the image header.
fn dimensions(bytes: &[u8]) -> Result<(u32, u32), image::ImageError> {
    ImageReader::new(Cursor::new(bytes)).with_guessed_format()?.into_dimensions()
}

fn log_image(label: &str, mime_type: &str, bytes: &[u8]) {
    match dimensions(bytes) {
        Ok((width, height)) => {
            info!(image = label, mime_type, size_bytes = bytes.len(), width, height, "Image input");
        }
        Err(err) => {
            warn!(
                image = label,
                mime_type,
                size_bytes = bytes.len(),
                error = %err,
                "Image input (dimensions unavailable)"
            );
        }
    }
}

/// Logs MIME type, size and dimensions of each labeled image.
pub fn log_image_inputs(images: &[(&str, &DataUrl)]) {
    for (label, image) in images {
        match image.decode() {
            Ok(bytes) => log_image(label, image.mime_type(), &bytes),
            Err(err) => warn!(image = *label, error = %err, "Image input could not be decoded"),
        }
    }
}

/// Logs every inline image in the call's content parts.
pub fn log_content_images(options: &CallOptions) {
    for (index, part) in options.parts.iter().enumerate() {
        if let ContentPart::InlineImage { mime_type, data } = part {
            let image = DataUrl::from_base64(mime_type.clone(), data.clone());
            let label = format!("part {index}");
            log_image_inputs(&[(label.as_str(), &image)]);
        }
    }
}
