//! Multipart form handling shared by the upload endpoints.

use std::collections::HashMap;

use axum::extract::Multipart;
use bytes::Bytes;

use crate::error::{AppError, AppResult};
use crate::media::{self, UploadRequest};

/// The `file` part of an upload form.
#[derive(Debug)]
pub struct FilePart {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl FilePart {
    /// Turn the part into an upload for `folder`. Only images and videos pass.
    pub fn into_request(self, folder: &str) -> AppResult<UploadRequest> {
        let (content_type, _) = media::classify(self.content_type.as_deref(), &self.filename)
            .ok_or_else(|| AppError::bad_request("Only image and video files are allowed."))?;
        Ok(UploadRequest {
            bytes: self.bytes,
            filename: self.filename,
            content_type,
            folder: folder.to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct UploadForm {
    file: Option<FilePart>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == "file" {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                form.file = Some(FilePart {
                    filename,
                    content_type,
                    bytes,
                });
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// The uploaded file, unless it is missing or empty.
    pub fn take_file(&mut self) -> Option<FilePart> {
        self.file.take().filter(|f| !f.bytes.is_empty())
    }

    /// A boolean text field; absent or unparseable reads as false.
    pub fn flag(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "on" | "yes"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(filename: &str, content_type: Option<&str>) -> FilePart {
        FilePart {
            filename: filename.into(),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from_static(b"data"),
        }
    }

    #[test]
    fn image_part_becomes_request() {
        let req = part("cat.png", Some("image/png")).into_request("posts").unwrap();
        assert_eq!(req.content_type, "image/png");
        assert_eq!(req.folder, "posts");
    }

    #[test]
    fn missing_content_type_is_guessed() {
        let req = part("clip.mp4", None).into_request("posts").unwrap();
        assert_eq!(req.content_type, "video/mp4");
    }

    #[test]
    fn documents_are_rejected() {
        let err = part("cv.pdf", Some("application/pdf"))
            .into_request("posts")
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn empty_files_are_dropped_and_flags_parse() {
        let mut form = UploadForm {
            file: Some(FilePart {
                filename: "x.png".into(),
                content_type: None,
                bytes: Bytes::new(),
            }),
            fields: HashMap::from([("story".to_string(), "True".to_string())]),
        };
        assert!(form.take_file().is_none());
        assert!(form.flag("story"));
        assert!(!form.flag("missing"));
    }
}
