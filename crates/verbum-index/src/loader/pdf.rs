use std::path::Path;

use super::{ExtractFuture, PageExtractor, split_pages};
use crate::DEFAULT_MAX_FILE_SIZE;
use crate::error::IndexError;

/// PDF text via `pdf-extract`, which separates pages with form feeds.
pub struct PdfLoader {
    pub max_file_size: u64,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl PageExtractor for PdfLoader {
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

            let path_buf = path.clone();
            let content = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text(&path_buf).map_err(|e| IndexError::Extraction {
                    path: path_buf.clone(),
                    message: e.to_string(),
                })
            })
            .await
            .map_err(|e| IndexError::Extraction {
                path: path.clone(),
                message: format!("extraction task failed: {e}"),
            })??;

            Ok(split_pages(&content))
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn corrupt_pdf_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.pdf");
        std::fs::write(&file, b"%PDF-1.4 not really a pdf").unwrap();

        let result = PdfLoader::default().extract(&file).await;
        assert!(matches!(result, Err(IndexError::Extraction { .. })));
    }

    #[test]
    fn supported_extensions_list() {
        assert_eq!(PdfLoader::default().supported_extensions(), &["pdf"]);
    }
}
