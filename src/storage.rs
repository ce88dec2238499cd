//! Upload tree and submission archives on the local filesystem
//!
//! Layout under the data root:
//!   uploads/<session>/<category>/<item>.<ext>
//!   archives/<session>_<category>_<timestamp>.zip  (entries <NN>_<item>.<ext> plus manifest.json)

use crate::catalog::Category;
use crate::runtime::{ArchiveHandle, DocumentStore, FetchedAttachment, StoredUpload};
use crate::session::UploadRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MANIFEST_NAME: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Filesystem-backed document store
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    session_id: &'a str,
    category: Category,
    created_at: DateTime<Utc>,
    items: Vec<ManifestItem>,
}

#[derive(Debug, Serialize)]
struct ManifestItem {
    item_name: String,
    entry: String,
    source_file_name: String,
    mime_type: String,
    size_bytes: u64,
    sha256: String,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn upload_dir(&self, session_id: &str, category: Category) -> PathBuf {
        self.root
            .join("uploads")
            .join(sanitize(session_id))
            .join(category.key())
    }

    fn archive_dir(&self) -> PathBuf {
        self.root.join("archives")
    }

    pub async fn write_upload(
        &self,
        session_id: &str,
        category: Category,
        item_name: &str,
        attachment: &FetchedAttachment,
    ) -> Result<StoredUpload, StorageError> {
        let dir = self.upload_dir(session_id, category);
        tokio::fs::create_dir_all(&dir).await?;

        let extension = extension_for(attachment.file_name.as_deref(), &attachment.mime_type);
        let file_name = format!("{}.{extension}", sanitize(item_name));
        let path = dir.join(&file_name);
        tokio::fs::write(&path, &attachment.bytes).await?;

        Ok(StoredUpload {
            path,
            file_name,
            size_bytes: attachment.bytes.len() as u64,
        })
    }

    pub async fn build_archive(
        &self,
        session_id: &str,
        category: Category,
        uploads: &[UploadRecord],
    ) -> Result<ArchiveHandle, StorageError> {
        let dir = self.archive_dir();
        tokio::fs::create_dir_all(&dir).await?;

        let created_at = Utc::now();
        let path = dir.join(format!(
            "{}_{}_{}.zip",
            sanitize(session_id),
            category.key(),
            created_at.format("%Y%m%dT%H%M%S%3f")
        ));

        let session_id = session_id.to_string();
        let uploads = uploads.to_vec();
        let archive_path = path.clone();
        let item_count = uploads.len();

        // zip writes synchronously
        tokio::task::spawn_blocking(move || {
            write_archive(&archive_path, &session_id, category, created_at, &uploads)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))??;

        let size_bytes = tokio::fs::metadata(&path).await?.len();
        Ok(ArchiveHandle {
            path,
            size_bytes,
            item_count,
        })
    }

    pub async fn remove_archive(&self, archive: &ArchiveHandle) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&archive.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn store_upload(
        &self,
        session_id: &str,
        category: Category,
        item_name: &str,
        attachment: &FetchedAttachment,
    ) -> Result<StoredUpload, String> {
        self.write_upload(session_id, category, item_name, attachment)
            .await
            .map_err(|e| e.to_string())
    }

    async fn package_uploads(
        &self,
        session_id: &str,
        category: Category,
        uploads: &[UploadRecord],
    ) -> Result<ArchiveHandle, String> {
        self.build_archive(session_id, category, uploads)
            .await
            .map_err(|e| e.to_string())
    }

    async fn discard_archive(&self, archive: &ArchiveHandle) -> Result<(), String> {
        self.remove_archive(archive).await.map_err(|e| e.to_string())
    }
}

fn write_archive(
    path: &Path,
    session_id: &str,
    category: Category,
    created_at: DateTime<Utc>,
    uploads: &[UploadRecord],
) -> Result<(), StorageError> {
    let mut zip = ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(6));

    let mut items = Vec::with_capacity(uploads.len());
    for (index, upload) in uploads.iter().enumerate() {
        let content = std::fs::read(&upload.stored_path)?;
        let extension = upload
            .stored_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let entry = format!("{:02}_{}.{extension}", index + 1, sanitize(&upload.item_name));

        zip.start_file(entry.as_str(), options)?;
        zip.write_all(&content)?;

        items.push(ManifestItem {
            item_name: upload.item_name.clone(),
            entry,
            source_file_name: upload.source_file_name.clone(),
            mime_type: upload.mime_type.clone(),
            size_bytes: content.len() as u64,
            sha256: format!("{:x}", Sha256::digest(&content)),
        });
    }

    let manifest = Manifest {
        session_id,
        category,
        created_at,
        items,
    };
    zip.start_file(MANIFEST_NAME, options)?;
    zip.write_all(&serde_json::to_vec_pretty(&manifest)?)?;

    zip.finish()?;
    Ok(())
}

/// Reduce arbitrary text to a safe single path component
fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

/// Extension from the reported file name, else from the MIME type
fn extension_for(file_name: Option<&str>, mime_type: &str) -> String {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));
    if let Some(ext) = from_name {
        return ext.to_ascii_lowercase();
    }

    mime_guess::get_mime_extensions_str(mime_type)
        .and_then(|exts| exts.first())
        .map_or_else(|| "bin".to_string(), |ext| (*ext).to_string())
}
