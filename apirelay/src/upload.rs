//! Inbound multipart form for `/api/upload` and the temp file it is staged in

use crate::hyper::body::Bytes;
use std::convert::Infallible;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const CONFIG_ID_FIELD: &str = "configId";
pub const FILE_FIELD: &str = "file";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("request is not multipart/form-data: {0}")]
    NotMultipart(#[source] multer::Error),
    #[error("malformed multipart body: {0}")]
    Malformed(#[from] multer::Error),
    #[error("staging upload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Parts of interest; unknown fields are drained and dropped
#[derive(Debug, Default)]
pub struct UploadForm {
    pub config_id: Option<String>,
    pub file: Option<UploadedFile>,
}

impl UploadForm {
    /// Parse an already size-limited body. The first occurrence of each field wins.
    pub async fn parse(content_type: Option<&str>, body: Bytes) -> Result<Self, UploadError> {
        let boundary = multer::parse_boundary(content_type.unwrap_or_default())
            .map_err(UploadError::NotMultipart)?;
        let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            match field.name() {
                Some(CONFIG_ID_FIELD) if form.config_id.is_none() => {
                    form.config_id = Some(field.text().await?);
                }
                Some(FILE_FIELD) if form.file.is_none() => {
                    let file_name = field
                        .file_name()
                        .filter(|n| !n.is_empty())
                        .unwrap_or(FILE_FIELD)
                        .to_string();
                    let bytes = field.bytes().await?;
                    form.file = Some(UploadedFile { file_name, bytes });
                }
                _ => {
                    field.bytes().await?;
                }
            }
        }
        Ok(form)
    }
}

/// Uploaded content staged on disk; removed when dropped
#[derive(Debug)]
pub struct TempUpload {
    file: NamedTempFile,
    file_name: String,
}

impl TempUpload {
    pub async fn stage(upload: UploadedFile) -> Result<Self, UploadError> {
        let UploadedFile { file_name, bytes } = upload;
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
            let mut file = tempfile::Builder::new().prefix("apirelay-").tempfile()?;
            file.write_all(&bytes)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(std::io::Error::other)??;

        tracing::debug!(path = %file.path().display(), file_name = %file_name, "Upload staged");
        Ok(Self { file, file_name })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}
