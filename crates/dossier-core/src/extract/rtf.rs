//! RTF text decoder.
//!
//! Small hand-rolled stripper covering the subset real uploads use:
//! control words, destination groups, hex and unicode escapes. Not a full
//! RTF parser; unknown control words are simply dropped.

/// Destination groups whose content is metadata, not document text.
const SKIP_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "header",
    "footer",
];

/// Strip RTF markup, returning the plain text.
pub fn extract(rtf: &str) -> String {
    let mut out = String::new();
    let mut chars = rtf.chars().peekable();
    // Depth at which a skip destination started; text is dropped while the
    // brace depth stays at or below it.
    let mut depth: i32 = 0;
    let mut skip_until: Option<i32> = None;

    while let Some(c) = chars.next() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if let Some(limit) = skip_until {
                    if depth < limit {
                        skip_until = None;
                    }
                }
            }
            '\\' => {
                match chars.peek() {
                    // Escaped literals
                    Some('\\') | Some('{') | Some('}') => {
                        if let Some(literal) = chars.next() {
                            if skip_until.is_none() {
                                out.push(literal);
                            }
                        }
                    }
                    // Hex escape \'hh (Windows-1252 byte)
                    Some('\'') => {
                        chars.next();
                        let hi = chars.next().unwrap_or('0');
                        let lo = chars.next().unwrap_or('0');
                        if skip_until.is_none() {
                            if let Ok(byte) =
                                u8::from_str_radix(&format!("{hi}{lo}"), 16)
                            {
                                let buf = [byte];
                                let decoded = encoding_rs::WINDOWS_1252.decode(&buf).0;
                                out.push_str(&decoded);
                            }
                        }
                    }
                    // Ignorable destination \*
                    Some('*') => {
                        chars.next();
                        skip_until.get_or_insert(depth);
                    }
                    _ => {
                        // Control word: letters, optional signed number,
                        // optional trailing space delimiter.
                        let mut word = String::new();
                        while let Some(&n) = chars.peek() {
                            if n.is_ascii_alphabetic() {
                                word.push(n);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        let mut param = String::new();
                        if let Some(&n) = chars.peek() {
                            if n == '-' {
                                param.push(n);
                                chars.next();
                            }
                        }
                        while let Some(&n) = chars.peek() {
                            if n.is_ascii_digit() {
                                param.push(n);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        if chars.peek() == Some(&' ') {
                            chars.next();
                        }

                        if skip_until.is_none() {
                            match word.as_str() {
                                "par" | "line" | "row" => out.push('\n'),
                                "tab" | "cell" => out.push('\t'),
                                "u" => {
                                    // \uN with a fallback character to skip
                                    if let Ok(code) = param.parse::<i32>() {
                                        let code = if code < 0 { code + 65536 } else { code };
                                        if let Some(ch) = char::from_u32(code as u32) {
                                            out.push(ch);
                                        }
                                    }
                                    chars.next();
                                }
                                w if SKIP_DESTINATIONS.contains(&w) => {
                                    skip_until = Some(depth);
                                }
                                _ => {}
                            }
                        }
                    }
                }
            }
            '\r' | '\n' => {}
            _ => {
                if skip_until.is_none() {
                    out.push(c);
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paragraphs() {
        let rtf = r"{\rtf1\ansi First line\par Second line\par}";
        assert_eq!(extract(rtf).trim(), "First line\nSecond line");
    }

    #[test]
    fn font_table_is_dropped() {
        let rtf = r"{\rtf1{\fonttbl{\f0 Times New Roman;}}Visible text}";
        let text = extract(rtf);
        assert!(!text.contains("Times"));
        assert!(text.contains("Visible text"));
    }

    #[test]
    fn hex_escape_decodes_windows_1252() {
        let rtf = r"{\rtf1 caf\'e9}";
        assert_eq!(extract(rtf).trim(), "café");
    }

    #[test]
    fn unicode_escape_decodes() {
        let rtf = r"{\rtf1 sm\u228?rre}";
        assert_eq!(extract(rtf).trim(), "smärre");
    }

    #[test]
    fn bold_markup_keeps_text() {
        let rtf = r"{\rtf1 normal {\b bold} after}";
        assert_eq!(extract(rtf).trim(), "normal bold after");
    }
}
