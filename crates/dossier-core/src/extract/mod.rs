//! Text extraction: format dispatch over the stored upload bytes.
//!
//! One decoder per supported format; anything else is a permanent
//! `UnsupportedFormat` error so the pipeline dead-letters instead of
//! retrying a document it can never read. Image formats route to the
//! pluggable [`OcrEngine`].

mod ocr;
mod office;
mod pdf;
mod rtf;

pub use ocr::{OcrEngine, VisionOcr};

use std::sync::Arc;

use crate::error::ExtractError;

/// Placeholder stored when a decoder succeeds but finds no text, so
/// downstream prompts always receive a non-empty `{document_text}`.
pub const EMPTY_TEXT_PLACEHOLDER: &str = "No text could be extracted from the document";

/// Extraction result: the text plus any provider tokens spent getting it.
/// Local decoders are free; the vision OCR path reports its usage so image
/// documents' extraction cost reaches the commit at the end of the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub tokens_spent: u64,
}

impl ExtractedText {
    fn free(text: String) -> Self {
        Self {
            text,
            tokens_spent: 0,
        }
    }
}

/// Supported document formats, detected from the filename extension with a
/// MIME-type fallback for unknown extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Doc,
    Rtf,
    Txt,
    Markdown,
    Odt,
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl DocumentFormat {
    /// Detect the format from a filename.
    pub fn detect(filename: &str) -> Result<Self, ExtractError> {
        let extension = filename
            .rsplit('.')
            .next()
            .filter(|ext| *ext != filename)
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let format = match extension.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "doc" => Some(DocumentFormat::Doc),
            "rtf" => Some(DocumentFormat::Rtf),
            "txt" => Some(DocumentFormat::Txt),
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            "odt" => Some(DocumentFormat::Odt),
            "png" => Some(DocumentFormat::Png),
            "jpg" | "jpeg" => Some(DocumentFormat::Jpeg),
            "webp" => Some(DocumentFormat::Webp),
            "gif" => Some(DocumentFormat::Gif),
            _ => None,
        };
        if let Some(format) = format {
            return Ok(format);
        }

        // Unknown extension: the MIME guess may still identify a plain-text
        // upload with an unusual suffix.
        let mime = mime_guess::from_path(filename).first_or_octet_stream();
        if mime.type_() == mime_guess::mime::TEXT {
            return Ok(DocumentFormat::Txt);
        }

        Err(ExtractError::UnsupportedFormat(if extension.is_empty() {
            filename.to_string()
        } else {
            extension
        }))
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self,
            DocumentFormat::Png | DocumentFormat::Jpeg | DocumentFormat::Webp | DocumentFormat::Gif
        )
    }

    /// MIME type used when handing image bytes to the OCR engine.
    pub fn mime_type(&self) -> &'static str {
        match self {
            DocumentFormat::Png => "image/png",
            DocumentFormat::Jpeg => "image/jpeg",
            DocumentFormat::Webp => "image/webp",
            DocumentFormat::Gif => "image/gif",
            DocumentFormat::Pdf => "application/pdf",
            DocumentFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentFormat::Doc => "application/msword",
            DocumentFormat::Rtf => "application/rtf",
            DocumentFormat::Odt => "application/vnd.oasis.opendocument.text",
            DocumentFormat::Txt => "text/plain",
            DocumentFormat::Markdown => "text/markdown",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Doc => "doc",
            DocumentFormat::Rtf => "rtf",
            DocumentFormat::Txt => "txt",
            DocumentFormat::Markdown => "md",
            DocumentFormat::Odt => "odt",
            DocumentFormat::Png => "png",
            DocumentFormat::Jpeg => "jpeg",
            DocumentFormat::Webp => "webp",
            DocumentFormat::Gif => "gif",
        };
        write!(f, "{name}")
    }
}

/// Format-dispatching text extractor.
pub struct TextExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl TextExtractor {
    /// Extractor for document formats only; images fail with `OcrUnavailable`.
    pub fn new() -> Self {
        Self { ocr: None }
    }

    pub fn with_ocr(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr: Some(ocr) }
    }

    /// Extract plain text from uploaded bytes.
    pub async fn extract_text(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ExtractedText, ExtractError> {
        let format = DocumentFormat::detect(filename)?;

        let mut extracted = match format {
            DocumentFormat::Pdf => ExtractedText::free(pdf::extract(bytes)?),
            DocumentFormat::Txt | DocumentFormat::Markdown => {
                ExtractedText::free(decode_text(bytes))
            }
            DocumentFormat::Rtf => ExtractedText::free(rtf::extract(&decode_text(bytes))),
            DocumentFormat::Docx => ExtractedText::free(office::extract_docx(bytes)?),
            DocumentFormat::Odt => ExtractedText::free(office::extract_odt(bytes)?),
            // Legacy binary .doc has no decoder in this stack; mislabelled
            // RTF uploads are common enough to be worth a signature check.
            DocumentFormat::Doc => {
                if bytes.starts_with(b"{\\rtf") {
                    ExtractedText::free(rtf::extract(&decode_text(bytes)))
                } else {
                    return Err(ExtractError::UnsupportedFormat("doc".to_string()));
                }
            }
            _ if format.is_image() => {
                let ocr = self.ocr.as_ref().ok_or(ExtractError::OcrUnavailable)?;
                ocr.recognize(bytes, format.mime_type()).await?
            }
            _ => unreachable!("non-image formats handled above"),
        };

        extracted.text = extracted.text.trim().to_string();
        tracing::debug!(
            format = %format,
            chars = extracted.text.len(),
            tokens = extracted.tokens_spent,
            "Extracted text"
        );

        if extracted.text.is_empty() {
            extracted.text = EMPTY_TEXT_PLACEHOLDER.to_string();
        }
        Ok(extracted)
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode bytes as UTF-8, falling back to Windows-1252 for legacy uploads.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}
