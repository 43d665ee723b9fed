use crate::config::AppConfig;
use crate::utils::validation::{ValidationError, validate_fields};
use axum::extract::Multipart;
use axum::extract::multipart::{Field, MultipartError};
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// A request that passed validation. `file` is positioned at its start.
#[derive(Debug)]
pub struct ValidatedUpload {
    pub origin: String,
    pub key: String,
    pub file_name: String,
    pub file: File,
    pub size: u64,
}

impl ValidatedUpload {
    /// `<key>/<fileName>`: cache key and notification payload.
    pub fn composite_key(&self) -> String {
        format!("{}/{}", self.key, self.file_name)
    }
}

fn multipart_error(e: MultipartError) -> ValidationError {
    ValidationError::Multipart(e.body_text())
}

fn spool_error(e: std::io::Error) -> ValidationError {
    ValidationError::Spool(e.to_string())
}

/// Copies a file part into an anonymous temp file, chunk by chunk, so
/// the text fields may arrive in any order relative to the file. The
/// temp file disappears when dropped.
async fn spool_file_part(
    mut field: Field<'_>,
    config: &AppConfig,
) -> Result<(File, u64), ValidationError> {
    let spooled = match &config.spool_dir {
        Some(dir) => tempfile::tempfile_in(dir),
        None => tempfile::tempfile(),
    }
    .map_err(spool_error)?;
    let mut file = File::from_std(spooled);

    let limit = config.max_upload_size as u64;
    let mut size: u64 = 0;

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        size += chunk.len() as u64;
        if size > limit {
            return Err(ValidationError::FileTooLarge {
                max: config.max_upload_size,
            });
        }
        file.write_all(&chunk).await.map_err(spool_error)?;
    }

    file.flush().await.map_err(spool_error)?;
    file.seek(SeekFrom::Start(0)).await.map_err(spool_error)?;
    Ok((file, size))
}

/// Reads the multipart body and checks `key`, `origin`, `fileName` and
/// the `file` part. Has no effect outside the spool directory.
pub async fn read_upload(
    multipart: &mut Multipart,
    config: &AppConfig,
) -> Result<ValidatedUpload, ValidationError> {
    let mut key = None;
    let mut origin = None;
    let mut file_name = None;
    let mut spooled = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "key" => key = Some(field.text().await.map_err(multipart_error)?),
            "origin" => origin = Some(field.text().await.map_err(multipart_error)?),
            "fileName" => file_name = Some(field.text().await.map_err(multipart_error)?),
            "file" => spooled = Some(spool_file_part(field, config).await?),
            _ => {
                tracing::debug!("Ignoring unexpected form field '{}'", name);
                while field.chunk().await.map_err(multipart_error)?.is_some() {}
            }
        }
    }

    validate_fields(key.as_deref(), origin.as_deref(), file_name.as_deref())?;
    let (file, size) = spooled.ok_or(ValidationError::MissingFile)?;

    Ok(ValidatedUpload {
        origin: origin.unwrap_or_default(),
        key: key.unwrap_or_default(),
        file_name: file_name.unwrap_or_default(),
        file,
        size,
    })
}
