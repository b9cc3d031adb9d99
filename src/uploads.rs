//! Parallel file uploads with per-file progress tracking.
//!
//! Uploads are an independent concurrent activity, uncoupled from the chat
//! stream: each file runs its own `uploading → completed | error` machine.
//! Validation (extension allowlist, size cap) happens synchronously before
//! any network call, so a rejected file never enters the pipeline.

use crate::api::{ApiClient, UploadedFile};
use crate::chat::model::{FileAttachment, FileSource};
use crate::config::UploadConfig;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Uploading,
    Completed,
    Error,
}

#[derive(Debug, Clone)]
pub struct UploadingFile {
    pub id: String,
    pub filename: String,
    pub size: u64,
    /// 0–100, driven by body-consumption progress callbacks.
    pub progress_pct: u8,
    pub status: UploadStatus,
    pub uploaded: Option<UploadedFile>,
    pub error: Option<String>,
}

#[derive(Debug)]
enum UploadUpdate {
    Progress { id: String, sent: u64, total: u64 },
    Completed { id: String, file: UploadedFile },
    Failed { id: String, error: String },
}

pub struct UploadManager {
    client: Arc<ApiClient>,
    pub files: Vec<UploadingFile>,
    max_bytes: u64,
    allowed_extensions: Vec<String>,
    tx: mpsc::UnboundedSender<UploadUpdate>,
    rx: mpsc::UnboundedReceiver<UploadUpdate>,
}

impl UploadManager {
    pub fn new(client: Arc<ApiClient>, config: &UploadConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            client,
            files: Vec::new(),
            max_bytes: config.max_file_size_mb * 1024 * 1024,
            allowed_extensions: config.allowed_extensions.clone(),
            tx,
            rx,
        }
    }

    /// Reject disallowed type/size before any network call.
    pub fn validate(&self, path: &Path, size: u64) -> Result<()> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        if !self.allowed_extensions.iter().any(|a| *a == ext) {
            anyhow::bail!(
                "File type not allowed: {}. Allowed: {}",
                if ext.is_empty() { "(none)" } else { &ext },
                self.allowed_extensions.join(", ")
            );
        }
        if size > self.max_bytes {
            anyhow::bail!(
                "File too large ({} bytes). Maximum: {} MB",
                size,
                self.max_bytes / (1024 * 1024)
            );
        }
        Ok(())
    }

    /// Validate and begin uploading. Errors here are synchronous rejections;
    /// once this returns Ok the file appears in `files` as Uploading.
    pub fn start_upload(&mut self, path: PathBuf) -> Result<()> {
        let meta = std::fs::metadata(&path)?;
        self.validate(&path, meta.len())?;

        let id = format!("up-{}", uuid::Uuid::new_v4().simple());
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        self.files.push(UploadingFile {
            id: id.clone(),
            filename,
            size: meta.len(),
            progress_pct: 0,
            status: UploadStatus::Uploading,
            uploaded: None,
            error: None,
        });

        let client = self.client.clone();
        let tx = self.tx.clone();
        let progress_tx = self.tx.clone();
        let progress_id = id.clone();
        tokio::spawn(async move {
            let result = client
                .upload_file(&path, move |sent, total| {
                    let _ = progress_tx.send(UploadUpdate::Progress {
                        id: progress_id.clone(),
                        sent,
                        total,
                    });
                })
                .await;
            let update = match result {
                Ok(file) => UploadUpdate::Completed { id, file },
                Err(e) => UploadUpdate::Failed {
                    id,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(update);
        });
        Ok(())
    }

    /// Drain and apply pending updates. Returns true if anything changed.
    pub fn poll_updates(&mut self) -> bool {
        let mut changed = false;
        while let Ok(update) = self.rx.try_recv() {
            self.apply(update);
            changed = true;
        }
        changed
    }

    fn apply(&mut self, update: UploadUpdate) {
        match update {
            UploadUpdate::Progress { id, sent, total } => {
                if let Some(file) = self.file_mut(&id) {
                    if file.status == UploadStatus::Uploading && total > 0 {
                        file.progress_pct = ((sent * 100) / total).min(100) as u8;
                    }
                }
            }
            UploadUpdate::Completed { id, file: uploaded } => {
                if let Some(file) = self.file_mut(&id) {
                    file.status = UploadStatus::Completed;
                    file.progress_pct = 100;
                    file.uploaded = Some(uploaded);
                }
            }
            UploadUpdate::Failed { id, error } => {
                warn!("Upload {} failed: {}", id, error);
                if let Some(file) = self.file_mut(&id) {
                    file.status = UploadStatus::Error;
                    file.error = Some(error);
                }
            }
        }
    }

    fn file_mut(&mut self, id: &str) -> Option<&mut UploadingFile> {
        self.files.iter_mut().find(|f| f.id == id)
    }

    pub fn has_active(&self) -> bool {
        self.files
            .iter()
            .any(|f| f.status == UploadStatus::Uploading)
    }

    /// Remove completed uploads and return them as attachments for the next
    /// send. Failed entries are dropped at the same time; in-flight ones stay.
    pub fn take_completed(&mut self) -> Vec<FileAttachment> {
        let mut attachments = Vec::new();
        self.files.retain(|f| match f.status {
            UploadStatus::Uploading => true,
            UploadStatus::Error => false,
            UploadStatus::Completed => {
                if let Some(uploaded) = &f.uploaded {
                    attachments.push(FileAttachment {
                        file_id: uploaded.file_id.clone(),
                        filename: uploaded.filename.clone(),
                        size: uploaded.size,
                        content_type: uploaded.content_type.clone(),
                        source: FileSource::User,
                        download_url: uploaded.download_url.clone(),
                    });
                }
                false
            }
        });
        attachments
    }
}
