use std::path::Path;

/// A local image picked by the user, not yet uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Lower-cased extension of the original file name, `bin` when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| "bin".to_string())
    }

    /// Explicit content type, or one guessed from the extension.
    pub fn mime_type(&self) -> String {
        if let Some(content_type) = &self.content_type {
            return content_type.clone();
        }
        match self.extension().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "heic" => "image/heic",
            _ => "application/octet-stream",
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_falls_back_to_bin() {
        assert_eq!(ImageFile::new("cat.PNG", vec![]).extension(), "png");
        assert_eq!(ImageFile::new("noext", vec![]).extension(), "bin");
        assert_eq!(ImageFile::new("../../etc/pa$$", vec![]).extension(), "bin");
    }

    #[test]
    fn mime_type_prefers_explicit_value() {
        let guessed = ImageFile::new("a.jpeg", vec![]);
        assert_eq!(guessed.mime_type(), "image/jpeg");
        let explicit = guessed.with_content_type("image/avif");
        assert_eq!(explicit.mime_type(), "image/avif");
    }
}
