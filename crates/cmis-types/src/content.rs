use serde::{Deserialize, Serialize};

/// A document's primary content or one of its renditions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStream {
    pub file_name: Option<String>,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ContentStream {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: None,
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Metadata of an alternate representation of a document (thumbnail, PDF
/// export, ...). The bytes are fetched separately by stream id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rendition {
    pub stream_id: String,
    pub mime_type: String,
    pub kind: String,
    pub length: Option<u64>,
    pub title: Option<String>,
    pub height: Option<u64>,
    pub width: Option<u64>,
    pub rendition_document_id: Option<String>,
}
