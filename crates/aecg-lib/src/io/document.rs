use crate::index::AecgDocument;
use anyhow::{Context, Result};
use std::path::Path;

/// Load an extracted aECG document from its JSON form.
///
/// A document without a `source` is named after the file it was read from.
pub fn read_document(path: &Path) -> Result<AecgDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut doc: AecgDocument = serde_json::from_str(&text)
        .with_context(|| format!("invalid aECG document {}", path.display()))?;
    if doc.source.is_empty() {
        doc.source = path.display().to_string();
    }
    Ok(doc)
}
