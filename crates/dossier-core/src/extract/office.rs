//! DOCX and ODT decoders.
//!
//! Both formats are zip containers around an XML body. The body markup is
//! stripped directly: paragraph closes become newlines, tabs become tabs,
//! everything else is dropped. Good enough for prompt input; layout is not
//! preserved.

use std::io::{Cursor, Read};

use crate::error::ExtractError;

/// Extract text from a DOCX upload (`word/document.xml`).
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let xml = read_zip_entry(bytes, "word/document.xml", "docx")?;
    Ok(strip_xml(&xml))
}

/// Extract text from an ODT upload (`content.xml`).
pub fn extract_odt(bytes: &[u8]) -> Result<String, ExtractError> {
    let xml = read_zip_entry(bytes, "content.xml", "odt")?;
    Ok(strip_xml(&xml))
}

fn read_zip_entry(bytes: &[u8], entry: &str, format: &str) -> Result<String, ExtractError> {
    let decode_err = |message: String| ExtractError::Decode {
        format: format.to_string(),
        message,
    };

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| decode_err(e.to_string()))?;
    let mut file = archive
        .by_name(entry)
        .map_err(|e| decode_err(format!("missing {entry}: {e}")))?;
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| decode_err(e.to_string()))?;
    Ok(xml)
}

/// Strip markup from WordprocessingML / OpenDocument content XML.
fn strip_xml(xml: &str) -> String {
    let mut out = String::new();
    let mut chars = xml.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '<' {
            let mut tag = String::new();
            for n in chars.by_ref() {
                if n == '>' {
                    break;
                }
                tag.push(n);
            }
            let name = tag
                .trim_end_matches('/')
                .split_whitespace()
                .next()
                .unwrap_or("");
            match name {
                "/w:p" | "/text:p" | "/text:h" | "w:br" | "w:br/" => {
                    if !out.ends_with('\n') && !out.is_empty() {
                        out.push('\n');
                    }
                }
                "w:tab" | "w:tab/" | "text:tab" | "text:tab/" => out.push('\t'),
                _ => {}
            }
        } else {
            push_entity_decoded(&mut out, c, &mut chars);
        }
    }

    out.trim().to_string()
}

/// Append a character, decoding `&...;` entities in place.
fn push_entity_decoded(
    out: &mut String,
    c: char,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) {
    if c != '&' {
        out.push(c);
        return;
    }

    let mut entity = String::new();
    while let Some(&n) = chars.peek() {
        if n == ';' {
            chars.next();
            break;
        }
        if entity.len() > 8 {
            break;
        }
        entity.push(n);
        chars.next();
    }
    match entity.as_str() {
        "amp" => out.push('&'),
        "lt" => out.push('<'),
        "gt" => out.push('>'),
        "quot" => out.push('"'),
        "apos" => out.push('\''),
        numeric if numeric.starts_with("#x") || numeric.starts_with("#X") => {
            if let Ok(code) = u32::from_str_radix(&numeric[2..], 16) {
                if let Some(ch) = char::from_u32(code) {
                    out.push(ch);
                }
            }
        }
        numeric if numeric.starts_with('#') => {
            if let Ok(code) = numeric[1..].parse::<u32>() {
                if let Some(ch) = char::from_u32(code) {
                    out.push(ch);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Build a minimal zip archive with one entry.
    fn test_zip(entry: &str, content: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file(entry, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn docx_paragraphs() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>First</w:t></w:r></w:p><w:p><w:r><w:t>Second</w:t></w:r></w:p></w:body></w:document>"#;
        let bytes = test_zip("word/document.xml", xml);
        assert_eq!(extract_docx(&bytes).unwrap(), "First\nSecond");
    }

    #[test]
    fn odt_entities_decode() {
        let xml = r#"<office:text><text:p>Smith &amp; Sons &#233;</text:p></office:text>"#;
        let bytes = test_zip("content.xml", xml);
        assert_eq!(extract_odt(&bytes).unwrap(), "Smith & Sons é");
    }

    #[test]
    fn non_zip_bytes_fail() {
        let err = extract_docx(b"not a zip file").unwrap_err();
        assert!(matches!(err, ExtractError::Decode { .. }));
    }

    #[test]
    fn zip_without_document_xml_fails() {
        let bytes = test_zip("other.xml", "<a>hi</a>");
        let err = extract_docx(&bytes).unwrap_err();
        assert!(matches!(err, ExtractError::Decode { .. }));
    }
}
