//! Media library: remote uploads and file management.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::api::{
  ApiClient, ApiError, ApiResult, Endpoint, FilePart, MultipartForm, Params, Transport,
};

const UPLOAD: Endpoint = Endpoint::post("media", "/upload");
const UPLOAD_FROM_URL: Endpoint = Endpoint::post("media", "/upload-from-url");
const LIST: Endpoint = Endpoint::get("media", "/media").cached();
const GET: Endpoint = Endpoint::get("media", "/media/{media_id}").cached();
const DELETE: Endpoint = Endpoint::delete("media", "/media/{media_id}");

pub const IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];
pub const VIDEO_TYPES: [&str; 4] = [
  "video/mp4",
  "video/quicktime",
  "video/x-msvideo",
  "video/webm",
];
pub const DOCUMENT_TYPES: [&str; 3] = [
  "application/pdf",
  "application/msword",
  "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Default upload size limit.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
  ProfilePicture,
  Deliverable,
  DealAttachment,
  ProofOfWork,
  #[default]
  General,
  MarketingMaterial,
}

impl FromStr for MediaCategory {
  type Err = ApiError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    serde_json::from_value(Value::String(s.to_string()))
      .map_err(|_| ApiError::validation(format!("Unknown media category '{}'", s)))
  }
}

/// Every MIME type accepted by default.
pub fn allowed_types() -> impl Iterator<Item = &'static str> {
  IMAGE_TYPES
    .iter()
    .chain(VIDEO_TYPES.iter())
    .chain(DOCUMENT_TYPES.iter())
    .copied()
}

/// MIME type for a file name, from its extension.
pub fn mime_from_name(name: &str) -> Option<&'static str> {
  let mime = match file_extension(name).as_str() {
    "jpg" | "jpeg" => "image/jpeg",
    "png" => "image/png",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "mp4" => "video/mp4",
    "mov" => "video/quicktime",
    "avi" => "video/x-msvideo",
    "webm" => "video/webm",
    "pdf" => "application/pdf",
    "doc" => "application/msword",
    "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    _ => return None,
  };
  Some(mime)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
  Image,
  Video,
  Pdf,
  Document,
  Other,
}

impl FileKind {
  pub fn from_mime(mime: &str) -> Self {
    if IMAGE_TYPES.contains(&mime) {
      Self::Image
    } else if VIDEO_TYPES.contains(&mime) {
      Self::Video
    } else if mime == "application/pdf" {
      Self::Pdf
    } else if mime.contains("word") {
      Self::Document
    } else {
      Self::Other
    }
  }
}

/// `0 Bytes`, `1.5 KB`, `2.25 MB`: binary units, at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
  if bytes == 0 {
    return "0 Bytes".to_string();
  }
  let mut value = bytes as f64;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  let rounded = (value * 100.0).round() / 100.0;
  format!("{} {}", rounded, UNITS[unit])
}

/// Lower-cased extension without the dot; empty for names without one.
pub fn file_extension(name: &str) -> String {
  match name.rsplit_once('.') {
    Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
    _ => String::new(),
  }
}

/// A file held in memory, ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
  pub name: String,
  pub mime_type: String,
  pub bytes: Vec<u8>,
}

impl LocalFile {
  pub fn new(name: &str, mime_type: &str, bytes: Vec<u8>) -> Self {
    Self {
      name: name.to_string(),
      mime_type: mime_type.to_string(),
      bytes,
    }
  }

  /// Read a file from disk; the MIME type comes from its extension.
  pub async fn read(path: &Path) -> Result<Self, ApiError> {
    let name = path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| ApiError::validation(format!("Invalid file path: {}", path.display())))?;
    let mime_type = mime_from_name(name).unwrap_or("application/octet-stream");
    let bytes = tokio::fs::read(path)
      .await
      .map_err(|err| ApiError::validation(format!("Failed to read {}: {}", path.display(), err)))?;
    Ok(Self::new(name, mime_type, bytes))
  }

  pub fn size(&self) -> u64 {
    self.bytes.len() as u64
  }
}

/// Pre-flight checks applied before a file is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRules {
  pub max_size: u64,
  /// Accepted MIME types; empty accepts anything.
  pub allowed_types: Vec<String>,
  /// Restrict names to letters, digits, `-`, `_`, `.` and spaces.
  pub check_file_name: bool,
}

impl Default for FileRules {
  fn default() -> Self {
    Self {
      max_size: MAX_FILE_SIZE,
      allowed_types: allowed_types().map(String::from).collect(),
      check_file_name: false,
    }
  }
}

/// Check a file against `rules`, reporting every violation at once.
pub fn validate_file(file: &LocalFile, rules: &FileRules) -> Result<(), ApiError> {
  if file.name.trim().is_empty() {
    return Err(ApiError::validation("No file provided"));
  }

  let mut errors = Vec::new();
  if file.size() > rules.max_size {
    errors.push(format!(
      "File size exceeds maximum of {}",
      format_file_size(rules.max_size)
    ));
  }
  let allowed = rules.allowed_types.is_empty()
    || rules.allowed_types.iter().any(|t| *t == file.mime_type);
  if !allowed {
    errors.push(format!("File type {} is not allowed", file.mime_type));
  }
  if rules.check_file_name && !is_plain_file_name(&file.name) {
    errors.push("File name contains invalid characters".to_string());
  }

  if errors.is_empty() {
    Ok(())
  } else {
    Err(ApiError::validation(errors.join(", ")))
  }
}

fn is_plain_file_name(name: &str) -> bool {
  name
    .chars()
    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
  pub category: MediaCategory,
  pub related_id: Option<u64>,
  pub related_type: Option<String>,
  pub rules: FileRules,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
  pub file_name: String,
  pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedUpload {
  pub file_name: String,
  pub error: ApiError,
}

/// Per-file outcome of [`MediaService::upload_files`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadReport {
  pub successful: Vec<UploadedFile>,
  pub failed: Vec<FailedUpload>,
}

impl UploadReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty()
  }
}

/// Import a file the backend fetches itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlUpload {
  pub url: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<MediaCategory>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub related_id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub related_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl UrlUpload {
  pub fn new(url: &str) -> Self {
    Self {
      url: url.to_string(),
      category: None,
      related_id: None,
      related_type: None,
      description: None,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
  pub category: Option<MediaCategory>,
  pub related_id: Option<u64>,
  pub related_type: Option<String>,
  pub limit: Option<u32>,
  pub offset: Option<u32>,
}

pub struct MediaService<T: Transport> {
  client: ApiClient<T>,
}

impl<T: Transport> MediaService<T> {
  pub fn new(client: ApiClient<T>) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &ApiClient<T> {
    &self.client
  }

  /// Validate `file`, then send it as a multipart form.
  pub async fn upload_file(&self, file: LocalFile, options: &UploadOptions) -> ApiResult<Value> {
    validate_file(&file, &options.rules)?;
    let form = MultipartForm::new()
      .text("category", category_param(options.category))
      .text_opt("related_id", options.related_id)
      .text_opt("related_type", options.related_type.as_deref())
      .text("original_filename", &file.name)
      .text("file_size", file.size())
      .text("mime_type", &file.mime_type)
      .file(FilePart {
        field: "file".to_string(),
        file_name: file.name,
        mime_type: file.mime_type,
        bytes: file.bytes,
      });
    self.client.upload(&UPLOAD, &Params::new(), form).await
  }

  /// Upload files one after another; a failure does not stop the rest.
  pub async fn upload_files(
    &self,
    files: Vec<LocalFile>,
    options: &UploadOptions,
  ) -> UploadReport {
    let mut report = UploadReport::default();
    for file in files {
      let file_name = file.name.clone();
      match self.upload_file(file, options).await {
        Ok(result) => report.successful.push(UploadedFile {
          file_name,
          data: result.data,
        }),
        Err(error) => report.failed.push(FailedUpload { file_name, error }),
      }
    }
    debug!(
      uploaded = report.successful.len(),
      failed = report.failed.len(),
      "batch upload finished"
    );
    report
  }

  pub async fn upload_from_url(&self, upload: &UrlUpload) -> ApiResult<Value> {
    let source = Url::parse(upload.url.trim())
      .map_err(|err| ApiError::validation(format!("Invalid media URL '{}': {}", upload.url, err)))?;
    if !matches!(source.scheme(), "http" | "https") {
      return Err(ApiError::validation(format!(
        "Media URL must use http or https, got '{}'",
        source.scheme()
      )));
    }
    self
      .client
      .request_with(&UPLOAD_FROM_URL, &Params::new(), upload)
      .await
  }

  pub async fn get_media_files(&self, filter: &MediaFilter) -> ApiResult<Value> {
    let params = Params::new()
      .query_opt("category", filter.category.map(category_param))
      .query_opt("related_id", filter.related_id)
      .query_opt("related_type", filter.related_type.as_deref())
      .query_opt("limit", filter.limit)
      .query_opt("offset", filter.offset);
    self.client.request(&LIST, &params, None).await
  }

  pub async fn get_media_file(&self, media_id: &str) -> ApiResult<Value> {
    let params = Params::new().path("media_id", media_id);
    self.client.request(&GET, &params, None).await
  }

  pub async fn delete_media_file(&self, media_id: &str) -> ApiResult<Value> {
    let params = Params::new().path("media_id", media_id);
    self.client.request(&DELETE, &params, None).await
  }
}

fn category_param(category: MediaCategory) -> String {
  serde_json::to_value(category)
    .ok()
    .and_then(|v| v.as_str().map(String::from))
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::credentials::static_token;
  use crate::api::mock::MockTransport;
  use serde_json::json;
  use std::sync::Arc;

  fn service(transport: &Arc<MockTransport>) -> MediaService<MockTransport> {
    let client = ApiClient::builder("http://media.test", Arc::clone(transport))
      .credentials(static_token("tok"))
      .build()
      .unwrap();
    MediaService::new(client)
  }

  #[tokio::test]
  async fn test_upload_from_url_requires_http() {
    let transport = MockTransport::new();
    transport.json(201, json!({"media_id": "m1"}));
    let service = service(&transport);

    for bad in ["ftp://files.test/a.png", "file:///etc/passwd", "not a url"] {
      let err = service.upload_from_url(&UrlUpload::new(bad)).await.unwrap_err();
      assert!(err.to_string().starts_with("validation:"), "{}", bad);
    }
    assert_eq!(transport.calls(), 0);

    let upload = UrlUpload {
      category: Some(MediaCategory::ProofOfWork),
      ..UrlUpload::new("https://cdn.test/a.png")
    };
    service.upload_from_url(&upload).await.unwrap();
    let body = transport.last_body();
    assert_eq!(
      body,
      json!({"url": "https://cdn.test/a.png", "category": "proof_of_work"})
    );
  }

  fn png(name: &str, size: usize) -> LocalFile {
    LocalFile::new(name, "image/png", vec![0u8; size])
  }

  #[test]
  fn test_validate_file() {
    let rules = FileRules::default();
    assert!(validate_file(&png("logo.png", 10), &rules).is_ok());

    let notes = LocalFile::new("notes.txt", "text/plain", vec![1]);
    let err = validate_file(&notes, &rules).unwrap_err();
    assert_eq!(err, ApiError::validation("File type text/plain is not allowed"));

    let strict = FileRules {
      max_size: 1024,
      check_file_name: true,
      ..FileRules::default()
    };
    let err = validate_file(&png("my<logo>.png", 2048), &strict).unwrap_err();
    assert_eq!(
      err.message(),
      "File size exceeds maximum of 1 KB, File name contains invalid characters"
    );
    assert!(validate_file(&png("final cut_v2.png", 10), &strict).is_ok());

    let anything = FileRules {
      allowed_types: Vec::new(),
      ..FileRules::default()
    };
    assert!(validate_file(&LocalFile::new("a.bin", "application/zip", vec![]), &anything).is_ok());
    assert_eq!(
      validate_file(&png("  ", 1), &rules).unwrap_err().message(),
      "No file provided"
    );
  }

  #[tokio::test]
  async fn test_upload_file_sends_form() {
    let transport = MockTransport::new();
    transport.json(201, json!({"media_id": "m9", "url": "https://cdn.test/m9.png"}));
    let service = service(&transport);

    let options = UploadOptions {
      category: MediaCategory::Deliverable,
      related_id: Some(42),
      related_type: Some("deliverable".into()),
      ..Default::default()
    };
    let result = service.upload_file(png("reel-cover.png", 3), &options).await.unwrap();
    assert_eq!(result.data["media_id"], "m9");

    let request = transport.last_request();
    assert_eq!(request.url.as_str(), "http://media.test/upload");
    assert_eq!(request.header("authorization"), Some("Bearer tok"));
    let form = transport.last_form();
    assert_eq!(form.field("category"), Some("deliverable"));
    assert_eq!(form.field("related_id"), Some("42"));
    assert_eq!(form.field("original_filename"), Some("reel-cover.png"));
    assert_eq!(form.field("file_size"), Some("3"));
    assert_eq!(form.field("mime_type"), Some("image/png"));
    assert_eq!(form.files.len(), 1);
    assert_eq!(form.files[0].field, "file");
    assert_eq!(form.files[0].bytes, vec![0u8; 3]);
  }

  #[tokio::test]
  async fn test_upload_file_rejects_before_sending() {
    let transport = MockTransport::new();
    let service = service(&transport);

    let options = UploadOptions {
      rules: FileRules {
        max_size: 2,
        ..FileRules::default()
      },
      ..Default::default()
    };
    let err = service.upload_file(png("big.png", 3), &options).await.unwrap_err();
    assert!(err.to_string().starts_with("validation:"));
    assert_eq!(transport.calls(), 0);
  }

  #[tokio::test]
  async fn test_upload_files_reports_each_file() {
    let transport = MockTransport::new();
    transport
      .json(201, json!({"media_id": "m1"}))
      .json(413, json!({"detail": "Upload too large"}));
    let service = service(&transport);

    let files = vec![
      png("one.png", 1),
      LocalFile::new("two.exe", "application/x-msdownload", vec![1]),
      png("three.png", 1),
    ];
    let report = service.upload_files(files, &UploadOptions::default()).await;

    assert!(!report.is_success());
    assert_eq!(report.successful.len(), 1);
    assert_eq!(report.successful[0].file_name, "one.png");
    let failed: Vec<_> = report.failed.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(failed, vec!["two.exe", "three.png"]);
    assert_eq!(report.failed[1].error.to_string(), "http 413: Upload too large");
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_upload_evicts_media_list() {
    let transport = MockTransport::new();
    transport
      .json(200, json!({"files": []}))
      .json(201, json!({"media_id": "m1"}))
      .json(200, json!({"files": [{"media_id": "m1"}]}));
    let service = service(&transport);

    service.get_media_files(&MediaFilter::default()).await.unwrap();
    service
      .upload_file(png("a.png", 1), &UploadOptions::default())
      .await
      .unwrap();
    let listed = service.get_media_files(&MediaFilter::default()).await.unwrap();
    assert!(!listed.from_cache_hit());
    assert_eq!(transport.calls(), 3);
  }

  #[tokio::test]
  async fn test_list_filter_with_separators_is_not_served_from_cache() {
    let transport = MockTransport::new();
    transport.json(200, json!({"files": ["a"]})).json(200, json!({"files": ["b"]}));
    let service = service(&transport);

    let odd = MediaFilter {
      related_type: Some("deal&limit=5".into()),
      ..Default::default()
    };
    let plain = MediaFilter {
      related_type: Some("deal".into()),
      limit: Some(5),
      ..Default::default()
    };
    service.get_media_files(&odd).await.unwrap();
    let second = service.get_media_files(&plain).await.unwrap();
    assert!(!second.from_cache_hit());
    assert_eq!(second.data, json!({"files": ["b"]}));
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_read_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Clip.MP4");
    std::fs::write(&path, b"data").unwrap();

    let file = LocalFile::read(&path).await.unwrap();
    assert_eq!(file.name, "Clip.MP4");
    assert_eq!(file.mime_type, "video/mp4");
    assert_eq!(file.size(), 4);

    let missing = LocalFile::read(&dir.path().join("nope.png")).await.unwrap_err();
    assert!(missing.to_string().starts_with("validation:"));
  }

  #[tokio::test]
  async fn test_delete_evicts_cached_media() {
    let transport = MockTransport::new();
    transport
      .json(200, json!({"media_id": "m1"}))
      .json(204, Value::Null)
      .json(404, json!({"detail": "Media not found"}));
    let service = service(&transport);

    service.get_media_file("m1").await.unwrap();
    service.delete_media_file("m1").await.unwrap();
    let err = service.get_media_file("m1").await.unwrap_err();
    assert_eq!(err.to_string(), "http 404: Media not found");
    assert_eq!(transport.calls(), 3);
  }

  #[tokio::test]
  async fn test_list_filters() {
    let transport = MockTransport::new();
    transport.json(200, json!({"files": []}));
    let service = service(&transport);

    let filter = MediaFilter {
      category: Some(MediaCategory::DealAttachment),
      related_id: Some(50),
      ..Default::default()
    };
    service.get_media_files(&filter).await.unwrap();
    assert_eq!(
      transport.last_request().url.as_str(),
      "http://media.test/media?category=deal_attachment&related_id=50"
    );
  }

  #[test]
  fn test_file_helpers() {
    assert_eq!(format_file_size(0), "0 Bytes");
    assert_eq!(format_file_size(512), "512 Bytes");
    assert_eq!(format_file_size(1536), "1.5 KB");
    assert_eq!(format_file_size(100 * 1024 * 1024), "100 MB");
    assert_eq!(file_extension("Clip.MP4"), "mp4");
    assert_eq!(file_extension(".env"), "");
    assert_eq!(file_extension("README"), "");
    assert_eq!(FileKind::from_mime("image/webp"), FileKind::Image);
    assert_eq!(FileKind::from_mime("application/msword"), FileKind::Document);
    assert_eq!(FileKind::from_mime("text/plain"), FileKind::Other);
    assert_eq!(mime_from_name("cover.JPG"), Some("image/jpeg"));
    assert_eq!(mime_from_name("archive.zip"), None);
    assert_eq!("proof_of_work".parse::<MediaCategory>(), Ok(MediaCategory::ProofOfWork));
    assert!("selfie".parse::<MediaCategory>().is_err());
  }
}
