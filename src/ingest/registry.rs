//! Extension-based ingestor dispatch.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::{Element, Ingestor};
use crate::error::{RetrievalError, Result};

/// Maps file extensions to an [`Ingestor`] implementation. Unsupported
/// extensions fail fast with a typed error before any work is done (§4.4).
#[derive(Default, Clone)]
pub struct IngestorRegistry {
    by_extension: HashMap<String, Arc<dyn Ingestor>>,
}

impl IngestorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an ingestor for every extension it declares.
    #[must_use]
    pub fn with_ingestor(mut self, ingestor: Arc<dyn Ingestor>) -> Self {
        for ext in ingestor.extensions() {
            self.by_extension.insert(ext.to_lowercase(), ingestor.clone());
        }
        self
    }

    /// Builds a registry with the PDF and DOCX ingestors shipped by this
    /// crate.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_ingestor(Arc::new(super::pdf::PdfIngestor::new()))
            .with_ingestor(Arc::new(super::docx::DocxIngestor::new()))
    }

    pub async fn parse(&self, path: &Path) -> Result<Vec<Element>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| {
                RetrievalError::invalid_input(format!(
                    "cannot determine file extension for {}",
                    path.display()
                ))
            })?;

        let ingestor = self.by_extension.get(&ext).ok_or_else(|| {
            RetrievalError::invalid_input(format!("no ingestor registered for extension '{ext}'"))
        })?;

        ingestor.parse(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_extension_fails_before_any_work() {
        let registry = IngestorRegistry::with_defaults();
        let result = registry.parse(Path::new("notes.txt")).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind, crate::error::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn missing_extension_fails() {
        let registry = IngestorRegistry::with_defaults();
        let result = registry.parse(Path::new("README")).await;
        assert!(result.is_err());
    }
}
