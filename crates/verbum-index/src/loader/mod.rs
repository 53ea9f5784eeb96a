use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use crate::error::IndexError;
use crate::types::Page;

#[cfg(feature = "pdf")]
mod pdf;
mod text;

#[cfg(feature = "pdf")]
pub use pdf::PdfLoader;
pub use text::TextLoader;

pub type ExtractFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Page>, IndexError>> + Send + 'a>>;

/// Turns a file into its ordered pages.
pub trait PageExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> ExtractFuture<'_>;

    fn supported_extensions(&self) -> &[&str];
}

/// Split extracted text into pages on form feeds. Page numbers start at 1.
///
/// A trailing empty segment after a final form feed is not a page.
#[must_use]
pub fn split_pages(text: &str) -> Vec<Page> {
    let mut segments: Vec<&str> = text.split('\u{c}').collect();
    if segments.len() > 1 && segments.last().is_some_and(|s| s.trim().is_empty()) {
        segments.pop();
    }
    segments
        .into_iter()
        .zip(1u32..)
        .map(|(segment, number)| Page {
            number,
            text: segment.to_owned(),
        })
        .collect()
}

/// Loader registry keyed by file extension.
pub struct Extractors {
    loaders: Vec<Box<dyn PageExtractor>>,
    timeout: Duration,
}

impl Extractors {
    /// Registry with the built-in text loader and, when enabled, the PDF loader.
    #[must_use]
    pub fn new(max_file_size: u64, timeout: Duration) -> Self {
        #[allow(unused_mut)]
        let mut loaders: Vec<Box<dyn PageExtractor>> = vec![Box::new(TextLoader { max_file_size })];
        #[cfg(feature = "pdf")]
        loaders.push(Box::new(PdfLoader { max_file_size }));
        Self { loaders, timeout }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn PageExtractor>) -> Self {
        self.loaders.insert(0, extractor);
        self
    }

    #[must_use]
    pub fn supports(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }

    fn find(&self, path: &Path) -> Option<&dyn PageExtractor> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.loaders
            .iter()
            .find(|l| l.supported_extensions().contains(&ext.as_str()))
            .map(|l| &**l)
    }

    /// Extract `path` with the matching loader, bounded by the extraction timeout.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat` when no loader handles the extension, `ExtractionTimeout`
    /// when the loader does not finish in time, or the loader's own error.
    pub async fn extract(&self, path: &Path) -> Result<Vec<Page>, IndexError> {
        let loader = self.find(path).ok_or_else(|| {
            IndexError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("<none>")
                    .to_owned(),
            )
        })?;
        tokio::time::timeout(self.timeout, loader.extract(path))
            .await
            .map_err(|_| IndexError::ExtractionTimeout {
                path: path.to_path_buf(),
            })?
    }
}
