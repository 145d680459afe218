//! Common handler utilities and shared query types

use axum::{extract::Multipart, http::HeaderMap};
use serde::{Deserialize, Deserializer};

use super::page::PageError;
use crate::models::ListParams;
use crate::services::UploadedFile;

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// `?page=` query; junk values fall back to the first page
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page", deserialize_with = "lenient_page")]
    pub page: u32,
}

impl PageQuery {
    /// Page number from raw query pairs, for handlers that read repeated keys
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let page = field(pairs, "page")
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1);
        Self { page }
    }

    pub fn params(&self, per_page: i64) -> ListParams {
        ListParams::new(self.page, per_page.clamp(1, 100) as u32)
    }
}

fn lenient_page<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().parse::<u32>().ok().filter(|p| *p > 0).unwrap_or(1))
}

/// First value submitted for a form field
pub fn field<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
}

/// Text fields and file parts of a multipart form
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<(String, UploadedFile)>,
}

impl MultipartForm {
    /// Take the file submitted under `name`
    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        let index = self.files.iter().position(|(key, _)| key == name)?;
        Some(self.files.swap_remove(index).1)
    }
}

/// Read a multipart body; empty file inputs are skipped
pub async fn read_multipart(mut multipart: Multipart) -> Result<MultipartForm, PageError> {
    let mut form = MultipartForm::default();

    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| PageError::BadRequest(format!("Invalid form data: {}", e)))?
    {
        let Some(name) = part.name().map(str::to_string) else {
            continue;
        };

        match part.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = part
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = part
                    .bytes()
                    .await
                    .map_err(|e| PageError::BadRequest(format!("Failed to read upload: {}", e)))?;
                if file_name.is_empty() || data.is_empty() {
                    continue;
                }
                form.files.push((
                    name,
                    UploadedFile {
                        file_name,
                        content_type,
                        data: data.to_vec(),
                    },
                ));
            }
            None => {
                let value = part
                    .text()
                    .await
                    .map_err(|e| PageError::BadRequest(format!("Invalid form field: {}", e)))?;
                form.fields.push((name, value));
            }
        }
    }

    Ok(form)
}

/// Whether the request came from the site's own scripts
pub fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "XMLHttpRequest")
}

/// Only same-site paths are accepted as `?next=` targets.
///
/// Control characters are rejected since browsers drop them from `Location`
/// before resolving it. Non-ASCII characters are percent-encoded so the
/// result is always a valid header value.
pub fn safe_next(next: Option<&str>) -> Option<String> {
    let next = next?.trim();
    if !next.starts_with('/')
        || next.starts_with("//")
        || next.contains('\\')
        || next.chars().any(|c| c.is_control())
    {
        return None;
    }

    let mut safe = String::with_capacity(next.len());
    for c in next.chars() {
        if c.is_ascii() {
            safe.push(c);
        } else {
            let mut buf = [0u8; 4];
            safe.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    Some(safe)
}
