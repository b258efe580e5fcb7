//! Local upload validation
//!
//! Type and size are checked before any request is built, so a rejected file
//! never reaches the transport.

use bytes::Bytes;
use transport::{MultipartPart, RequestBody};

use crate::config::UploadPolicy;
use crate::error::{ApiError, FieldError};

/// Multipart field name the server reads the file from.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl FileUpload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub(crate) fn into_body(self) -> RequestBody {
        RequestBody::Multipart(vec![MultipartPart {
            name: FILE_FIELD.to_string(),
            file_name: Some(self.file_name),
            content_type: self.content_type,
            data: self.data,
        }])
    }
}

/// Check `upload` against `policy`. Type is checked before size.
pub fn validate(upload: &FileUpload, policy: &UploadPolicy) -> Result<(), ApiError> {
    if !type_allowed(&upload.content_type, &policy.allowed_types) {
        return Err(rejected(format!("Unsupported file type: {}", upload.content_type)));
    }

    if upload.size() > policy.max_size_bytes {
        let limit_mb = policy.max_size_bytes as f64 / 1024.0 / 1024.0;
        return Err(rejected(format!("File size must not exceed {limit_mb}MB")));
    }

    Ok(())
}

fn type_allowed(content_type: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let wanted = essence(content_type);
    allowed.iter().any(|a| essence(a).eq_ignore_ascii_case(wanted))
}

// "image/png; charset=binary" -> "image/png"
fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or(content_type).trim()
}

fn rejected(message: String) -> ApiError {
    ApiError::Validation {
        fields: vec![FieldError {
            field: FILE_FIELD.to_string(),
            messages: vec![message.clone()],
        }],
        message,
    }
}
