use crate::helper::form_helpers::FormErrors;
use actix_multipart::Multipart;
use actix_web::web;
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Text parts of a multipart form never need more than this.
const MAX_TEXT_FIELD_BYTES: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Multipart error: {0}")]
    Multipart(#[from] actix_multipart::MultipartError),
    #[error("Invalid UTF-8 in form field '{0}'.")]
    InvalidUtf8(String),
    #[error("Form field '{0}' is too large.")]
    FieldTooLarge(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blocking task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

/// Maps an accepted image MIME type to the extension files are stored under.
fn mime_to_safe_extension(mime_type: &str) -> Option<&'static str> {
    let map: BTreeMap<&str, &str> = [
        ("image/gif", "gif"),
        ("image/jpeg", "jpg"),
        ("image/png", "png"),
        ("image/webp", "webp"),
    ]
    .iter()
    .cloned()
    .collect();

    map.get(mime_type).cloned()
}

#[derive(Debug)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// A fully buffered multipart form. Rejected files become field errors.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, UploadedImage>,
    pub file_errors: FormErrors,
}

/// Drains the payload. `file_fields` names the parts treated as image uploads;
/// an empty file part (no file chosen) is ignored.
pub async fn read_multipart_form(
    mut payload: Multipart,
    file_fields: &[&str],
    max_file_bytes: u64,
) -> Result<MultipartForm, UploadError> {
    let mut form = MultipartForm::default();

    while let Some(item) = payload.next().await {
        let mut field = item?;
        let field_name = field.content_disposition().get_name().unwrap_or_default().to_string();

        if file_fields.contains(&field_name.as_str()) {
            let has_filename = field
                .content_disposition()
                .get_filename()
                .map_or(false, |name| !name.is_empty());
            let content_type = field.content_type().map(|m| m.essence_str().to_string()).unwrap_or_default();

            let mut data = Vec::new();
            let mut too_large = false;
            while let Some(chunk) = field.next().await {
                let chunk = chunk?;
                if too_large {
                    continue;
                }
                if (data.len() + chunk.len()) as u64 > max_file_bytes {
                    too_large = true;
                    data.clear();
                    continue;
                }
                data.extend_from_slice(&chunk);
            }

            if !has_filename && data.is_empty() && !too_large {
                continue;
            }
            if too_large {
                form.file_errors.add(
                    &field_name,
                    format!("File is too large. Maximum size is {}MB.", max_file_bytes / (1024 * 1024)),
                );
                continue;
            }
            match mime_to_safe_extension(&content_type) {
                Some(extension) if !data.is_empty() => {
                    form.files.insert(field_name, UploadedImage { bytes: data, extension });
                }
                Some(_) => form.file_errors.add(&field_name, "The submitted file is empty."),
                None => form.file_errors.add(
                    &field_name,
                    format!("Unsupported file type: '{}'. Upload a PNG, JPEG, GIF or WebP image.", content_type),
                ),
            }
        } else {
            let mut data = Vec::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk?;
                if data.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
                    return Err(UploadError::FieldTooLarge(field_name));
                }
                data.extend_from_slice(&chunk);
            }
            let value = String::from_utf8(data).map_err(|_| UploadError::InvalidUtf8(field_name.clone()))?;
            form.fields.insert(field_name, value);
        }
    }

    Ok(form)
}

/// Relative location for a new upload: `<kind>/<aa>/<bb>/<uuid>.<ext>`.
pub fn media_relative_path(kind: &str, extension: &str) -> String {
    let file_id = Uuid::new_v4().to_string();
    format!("{}/{}/{}/{}.{}", kind, &file_id[0..2], &file_id[2..4], file_id, extension)
}

/// Writes the image under the media root and returns its relative path.
pub async fn save_image(media_root: &Path, kind: &str, image: UploadedImage) -> Result<String, UploadError> {
    let relative = media_relative_path(kind, image.extension);
    let final_path = media_root.join(&relative);

    web::block(move || -> std::io::Result<()> {
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&final_path, &image.bytes)
    })
    .await??;

    Ok(relative)
}

/// Best-effort removal of a replaced or cleared upload.
pub async fn remove_image(media_root: &Path, relative: &str) {
    if relative.contains("..") {
        log::warn!("Refusing to remove media path outside the media root: {}", relative);
        return;
    }
    let path: PathBuf = media_root.join(relative);
    match web::block(move || fs::remove_file(path)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("Could not remove media file '{}': {}", relative, e),
        Err(e) => log::warn!("Could not remove media file '{}': {}", relative, e),
    }
}
