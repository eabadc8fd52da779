//! Attachments reach the orchestrator as opaque handles. A collaborator turns a
//! handle into image bytes or extracted document text.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::models::Attachment;

pub type AttachmentFuture<'a> =
    Pin<Box<dyn Future<Output = Result<AttachmentContent, AttachmentError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentContent {
    Image { bytes: Vec<u8>, mime_type: String },
    /// Text already extracted from a PDF, DOCX, or XLSX file.
    Text(String),
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("attachment {0} could not be found")]
    NotFound(String),
    #[error("attachment could not be read: {0}")]
    Unreadable(String),
}

pub trait AttachmentResolver: Send + Sync {
    fn resolve<'a>(&'a self, attachment: &'a Attachment) -> AttachmentFuture<'a>;
}

/// Resolver backed by a map from `source_ref` to content. Used by tests and the
/// evaluation harness.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttachmentResolver {
    contents: HashMap<String, AttachmentContent>,
}

impl InMemoryAttachmentResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source_ref: impl Into<String>, content: AttachmentContent) {
        self.contents.insert(source_ref.into(), content);
    }

    pub fn with(mut self, source_ref: impl Into<String>, content: AttachmentContent) -> Self {
        self.insert(source_ref, content);
        self
    }
}

impl AttachmentResolver for InMemoryAttachmentResolver {
    fn resolve<'a>(&'a self, attachment: &'a Attachment) -> AttachmentFuture<'a> {
        Box::pin(async move {
            self.contents
                .get(&attachment.source_ref)
                .cloned()
                .ok_or_else(|| AttachmentError::NotFound(attachment.name.clone()))
        })
    }
}

/// Best-effort MIME type from a file name, for hosts that only know the name.
pub fn image_mime_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AttachmentContent, AttachmentError, AttachmentResolver, InMemoryAttachmentResolver,
        image_mime_type,
    };
    use crate::models::{Attachment, AttachmentKind};

    fn attachment(source_ref: &str) -> Attachment {
        Attachment {
            name: "q3-report.pdf".to_string(),
            kind: AttachmentKind::Pdf,
            size_bytes: 2_048,
            source_ref: source_ref.to_string(),
        }
    }

    #[tokio::test]
    async fn in_memory_resolver_looks_up_by_source_ref() {
        let resolver = InMemoryAttachmentResolver::new().with(
            "att-1",
            AttachmentContent::Text("Revenue grew 12%.".to_string()),
        );

        let content = resolver
            .resolve(&attachment("att-1"))
            .await
            .expect("attachment should resolve");
        assert_eq!(content, AttachmentContent::Text("Revenue grew 12%.".to_string()));

        let missing = resolver.resolve(&attachment("att-2")).await;
        assert!(matches!(missing, Err(AttachmentError::NotFound(name)) if name == "q3-report.pdf"));
    }

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(image_mime_type("Screenshot.PNG"), "image/png");
        assert_eq!(image_mime_type("photo.jpeg"), "image/jpeg");
        assert_eq!(image_mime_type("no-extension"), "image/jpeg");
    }
}
