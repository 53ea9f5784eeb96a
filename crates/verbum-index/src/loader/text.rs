use std::path::Path;

use super::{ExtractFuture, PageExtractor, split_pages};
use crate::DEFAULT_MAX_FILE_SIZE;
use crate::error::IndexError;

/// Plain text and markdown. Form feeds separate pages.
pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl PageExtractor for TextLoader {
    fn extract(&self, path: &Path) -> ExtractFuture<'_> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let meta = tokio::fs::metadata(&path).await?;
            if meta.len() > max_size {
                return Err(IndexError::FileTooLarge {
                    size: meta.len(),
                    limit: max_size,
                });
            }

            let bytes = tokio::fs::read(&path).await?;
            let content = String::from_utf8(bytes).map_err(|e| IndexError::Extraction {
                path: path.clone(),
                message: e.to_string(),
            })?;

            Ok(split_pages(&content))
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }
}
