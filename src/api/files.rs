use super::ApiClient;
use crate::chat::model::FileAttachment;
use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metadata returned by the storage backend after an upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilePreview {
    pub content: String,
    pub filename: String,
}

/// Body chunk size for upload progress granularity.
const UPLOAD_CHUNK: usize = 64 * 1024;

impl ApiClient {
    /// Upload a file as multipart form data. `progress` is invoked with
    /// `(bytes_sent, total_bytes)` as the request body is consumed.
    ///
    /// Validation (extension allowlist, size cap) happens in the upload
    /// manager before this is ever called.
    pub async fn upload_file(
        &self,
        path: &Path,
        progress: impl Fn(u64, u64) + Send + Sync + 'static,
    ) -> Result<UploadedFile> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("File has no usable name")?
            .to_string();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let total = data.len() as u64;

        let sent = Arc::new(AtomicU64::new(0));
        let progress = Arc::new(progress);
        let chunks: Vec<Vec<u8>> = data.chunks(UPLOAD_CHUNK).map(|c| c.to_vec()).collect();
        let stream = futures_util::stream::iter(chunks.into_iter().map({
            let sent = sent.clone();
            let progress = progress.clone();
            move |chunk| {
                let so_far = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed)
                    + chunk.len() as u64;
                progress(so_far, total);
                Ok::<_, std::io::Error>(chunk)
            }
        }));

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(filename)
            .mime_str(&content_type)?;
        let form = Form::new().part("file", part);

        let resp = self
            .http()
            .post(self.url("/api/files/upload"))
            .multipart(form)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    /// Fetch text content for preview. The backend rejects binary types.
    pub async fn file_content(&self, file_id: &str) -> Result<FilePreview> {
        let resp = self
            .http()
            .get(self.url(&format!(
                "/api/files/{}/content",
                urlencoding::encode(file_id)
            )))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    /// Absolute download URL for an attachment (its `download_url` is
    /// server-relative).
    pub fn download_url(&self, file: &FileAttachment) -> String {
        if file.download_url.starts_with("http://") || file.download_url.starts_with("https://") {
            return file.download_url.clone();
        }
        format!("{}{}", self.base_url(), file.download_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::model::FileSource;

    #[test]
    fn test_uploaded_file_parse() {
        let file: UploadedFile = serde_json::from_str(
            r#"{"file_id":"f1","filename":"report.pdf","size":1024,
                "content_type":"application/pdf","download_url":"/api/files/f1/report.pdf"}"#,
        )
        .unwrap();
        assert_eq!(file.file_id, "f1");
        assert_eq!(file.size, 1024);
    }

    #[test]
    fn test_download_url_joins_relative() {
        let client = ApiClient::new("http://localhost:8000").unwrap();
        let file = FileAttachment {
            file_id: "f1".into(),
            filename: "a.txt".into(),
            size: 1,
            content_type: "text/plain".into(),
            source: FileSource::Agent,
            download_url: "/api/files/f1/a.txt".into(),
        };
        assert_eq!(
            client.download_url(&file),
            "http://localhost:8000/api/files/f1/a.txt"
        );
    }

    #[test]
    fn test_download_url_keeps_absolute() {
        let client = ApiClient::new("http://localhost:8000").unwrap();
        let file = FileAttachment {
            file_id: "f1".into(),
            filename: "a.txt".into(),
            size: 1,
            content_type: "text/plain".into(),
            source: FileSource::User,
            download_url: "https://cdn.example.com/a.txt".into(),
        };
        assert_eq!(client.download_url(&file), "https://cdn.example.com/a.txt");
    }
}
