//! PDF text decoder (lopdf).

use crate::error::ExtractError;

/// Extract text from PDF bytes, pages in order.
pub fn extract(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Decode {
        format: "pdf".to_string(),
        message: e.to_string(),
    })?;

    let mut pages: Vec<u32> = doc.get_pages().keys().cloned().collect();
    pages.sort();

    let mut full_text = String::new();
    for page_num in &pages {
        let page_text = doc.extract_text(&[*page_num]).unwrap_or_default();
        // Collapse the erratic intra-page whitespace lopdf produces.
        let cleaned = page_text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !cleaned.is_empty() {
            if !full_text.is_empty() {
                full_text.push('\n');
            }
            full_text.push_str(&cleaned);
        }
    }

    tracing::debug!(pages = pages.len(), chars = full_text.len(), "Parsed PDF");
    Ok(full_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a minimal single-page PDF containing the given text.
    fn test_pdf(text: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let content = format!(
            "BT /F1 12 Tf 100 700 Td ({}) Tj ET",
            text.replace('\\', "\\\\")
                .replace('(', "\\(")
                .replace(')', "\\)")
        );
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });

        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        });

        if let Ok(Object::Dictionary(ref mut page)) = doc.get_object_mut(page_id) {
            page.set("Parent", pages_id);
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn extracts_page_text() {
        let bytes = test_pdf("Rental agreement terms");
        let text = extract(&bytes).unwrap();
        assert!(text.contains("Rental agreement terms"), "got: {text:?}");
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = extract(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Decode { .. }));
    }
}
