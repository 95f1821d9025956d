//! Section reader
//!
//! Splits a PSF container into its ordered logical sections. The choice of
//! physical encoding is made here, once; every later stage sees the same
//! `Section` sequence regardless of how the file was written.

use crate::reader::ByteCursor;
use crate::types::*;
use tracing::{debug, trace};

/// Body of one section
#[derive(Debug, Clone, Copy)]
pub enum SectionBody<'a> {
    /// Structured text; `line` is the file line the body starts on
    Text { text: &'a str, line: usize },
    /// Densely packed binary value payload
    Binary(&'a [u8]),
}

/// One logical section and the byte span it covers in the container
#[derive(Debug, Clone, Copy)]
pub struct Section<'a> {
    pub kind: SectionKind,
    pub offset: usize,
    pub len: usize,
    pub body: SectionBody<'a>,
}

impl<'a> Section<'a> {
    /// Text body with its starting line, or `MalformedContainer`
    pub fn text(&self) -> Result<(&'a str, usize)> {
        match self.body {
            SectionBody::Text { text, line } => Ok((text, line)),
            SectionBody::Binary(_) => Err(PsfError::malformed(format!(
                "{} section has a binary body",
                self.kind
            ))),
        }
    }
}

/// A container split into sections, END marker included
#[derive(Debug)]
pub struct Container<'a> {
    pub encoding: Encoding,
    pub sections: Vec<Section<'a>>,
}

impl<'a> Container<'a> {
    pub fn section(&self, kind: SectionKind) -> Option<&Section<'a>> {
        self.sections.iter().find(|s| s.kind == kind)
    }
}

/// Detect the encoding from the leading bytes
pub fn detect_encoding(data: &[u8]) -> Result<Encoding> {
    let first = *data
        .first()
        .ok_or_else(|| PsfError::malformed("file is empty"))?;

    if first >= b' ' {
        if data.starts_with(TEXT_SIGNATURE.as_bytes()) {
            return Ok(Encoding::Text);
        }
        return Err(PsfError::malformed(format!(
            "text container does not start with {}",
            TEXT_SIGNATURE
        )));
    }

    ByteCursor::detect_endian(data, BINARY_REVISION)
        .map(Encoding::Binary)
        .ok_or_else(|| PsfError::malformed("unrecognized binary signature"))
}

/// Split `data` into ordered sections
pub fn read_sections(data: &[u8]) -> Result<Container<'_>> {
    let encoding = detect_encoding(data)?;
    debug!(?encoding, bytes = data.len(), "Encoding detected");

    let sections = match encoding {
        Encoding::Text => split_text(data)?,
        Encoding::Binary(endian) => split_binary(data, endian)?,
    };
    validate_order(&sections)?;
    for section in &sections {
        trace!(section = %section.kind, offset = section.offset, len = section.len, "Section");
    }

    Ok(Container { encoding, sections })
}

// ============================================================================
// Textual encoding
// ============================================================================

fn split_text(data: &[u8]) -> Result<Vec<Section<'_>>> {
    let text = std::str::from_utf8(data)
        .map_err(|e| PsfError::malformed(format!("text container is not UTF-8: {}", e)))?;

    let mut sections = Vec::new();
    // (kind, offset of keyword line, offset of body, body line)
    let mut open: Option<(SectionKind, usize, usize, usize)> = None;
    let mut offset = 0;
    let mut ended = false;

    for (index, raw_line) in text.split_inclusive('\n').enumerate() {
        let line_no = index + 1;
        let trimmed = raw_line.trim();
        let line_start = offset;
        offset += raw_line.len();

        if ended {
            if !trimmed.is_empty() {
                return Err(PsfError::malformed(format!(
                    "line {}: content after END",
                    line_no
                )));
            }
            continue;
        }

        let Some(kind) = SectionKind::from_keyword(trimmed) else {
            if open.is_none() {
                return Err(PsfError::malformed(format!(
                    "line {}: content before HEADER",
                    line_no
                )));
            }
            continue;
        };

        if let Some((prev, start, body_start, body_line)) = open.take() {
            sections.push(Section {
                kind: prev,
                offset: start,
                len: line_start - start,
                body: SectionBody::Text {
                    text: &text[body_start..line_start],
                    line: body_line,
                },
            });
        }

        if kind == SectionKind::End {
            sections.push(Section {
                kind,
                offset: line_start,
                len: raw_line.len(),
                body: SectionBody::Text { text: "", line: line_no },
            });
            ended = true;
        } else {
            open = Some((kind, line_start, offset, line_no + 1));
        }
    }

    if !ended {
        return Err(PsfError::malformed("missing END marker"));
    }
    Ok(sections)
}

// ============================================================================
// Binary-payload encoding
// ============================================================================

fn split_binary(data: &[u8], endian: Endian) -> Result<Vec<Section<'_>>> {
    let mut cursor = ByteCursor::new(data, endian);
    cursor.skip(4)?;

    // The revision word and skipped frames belong to the next known section
    let mut span_start = 0;
    let mut sections = Vec::new();
    loop {
        if cursor.remaining() < FRAME_HEADER_SIZE {
            return Err(PsfError::malformed("missing END marker"));
        }
        let offset = cursor.position();
        let code = cursor.read_u32()?;
        let len = cursor.read_u32()? as usize;
        if len > cursor.remaining() {
            return Err(PsfError::malformed(format!(
                "section at offset {} declares {} bytes, only {} remain",
                offset,
                len,
                cursor.remaining()
            )));
        }
        let payload = cursor.read_bytes(len)?;

        let Some(kind) = SectionKind::from_code(code) else {
            debug!(code, offset, len, "Skipping unknown section");
            continue;
        };

        let body = match kind {
            SectionKind::Value => SectionBody::Binary(payload),
            _ => {
                let text = std::str::from_utf8(payload).map_err(|e| {
                    PsfError::malformed(format!("{} section is not UTF-8: {}", kind, e))
                })?;
                SectionBody::Text { text, line: 1 }
            }
        };
        sections.push(Section {
            kind,
            offset: span_start,
            len: cursor.position() - span_start,
            body,
        });
        span_start = cursor.position();

        if kind == SectionKind::End {
            break;
        }
    }

    if cursor.remaining() > 0 {
        return Err(PsfError::malformed(format!(
            "{} bytes after END marker",
            cursor.remaining()
        )));
    }
    Ok(sections)
}

// ============================================================================
// Ordering
// ============================================================================

/// Enforce HEADER first, END last, and strictly increasing section order
fn validate_order(sections: &[Section<'_>]) -> Result<()> {
    match sections.first() {
        Some(s) if s.kind == SectionKind::Header => {}
        _ => return Err(PsfError::malformed("container does not start with HEADER")),
    }

    for pair in sections.windows(2) {
        if pair[1].kind <= pair[0].kind {
            return Err(PsfError::malformed(format!(
                "{} section at offset {} follows {}",
                pair[1].kind, pair[1].offset, pair[0].kind
            )));
        }
    }

    let has = |kind| sections.iter().any(|s| s.kind == kind);
    if has(SectionKind::Value) && !has(SectionKind::Type) {
        return Err(PsfError::malformed("VALUE section without a TYPE section"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "HEADER\n\"PSFversion\" \"1.00\"\nTYPE\nSWEEP\nTRACE\nVALUE\nEND\n";

    fn frame(out: &mut Vec<u8>, code: u32, payload: &[u8]) {
        out.extend_from_slice(&code.to_be_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
    }

    #[test]
    fn test_text_sections_cover_file() {
        let container = read_sections(MINIMAL.as_bytes()).unwrap();
        assert_eq!(container.encoding, Encoding::Text);
        let kinds: Vec<_> = container.sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::Header,
                SectionKind::Type,
                SectionKind::Sweep,
                SectionKind::Trace,
                SectionKind::Value,
                SectionKind::End,
            ]
        );
        let covered: usize = container.sections.iter().map(|s| s.len).sum();
        assert_eq!(covered, MINIMAL.len());

        let (body, line) = container.sections[0].text().unwrap();
        assert_eq!(body, "\"PSFversion\" \"1.00\"\n");
        assert_eq!(line, 2);
    }

    #[test]
    fn test_missing_end() {
        let err = read_sections(b"HEADER\nTYPE\n").unwrap_err();
        assert!(matches!(err, PsfError::MalformedContainer(_)));
    }

    #[test]
    fn test_value_before_type() {
        let err = read_sections(b"HEADER\nVALUE\nTYPE\nEND\n").unwrap_err();
        assert!(matches!(err, PsfError::MalformedContainer(_)));
    }

    #[test]
    fn test_value_without_type() {
        let err = read_sections(b"HEADER\nVALUE\nEND\n").unwrap_err();
        assert!(matches!(err, PsfError::MalformedContainer(_)));
    }

    #[test]
    fn test_bad_text_signature() {
        let err = read_sections(b"PSF\nEND\n").unwrap_err();
        assert!(matches!(err, PsfError::MalformedContainer(_)));
        assert!(matches!(
            read_sections(b"").unwrap_err(),
            PsfError::MalformedContainer(_)
        ));
    }

    #[test]
    fn test_binary_frames() {
        let mut data = BINARY_REVISION.to_be_bytes().to_vec();
        frame(&mut data, SECTION_CODE_HEADER, b"\"PSFversion\" \"1.00\"");
        frame(&mut data, 99, b"ignored");
        frame(&mut data, SECTION_CODE_TYPE, b"");
        frame(&mut data, SECTION_CODE_VALUE, &[0, 0, 0, 0]);
        frame(&mut data, SECTION_CODE_END, b"");

        let container = read_sections(&data).unwrap();
        assert_eq!(container.encoding, Encoding::Binary(Endian::Big));
        assert_eq!(container.sections.len(), 4);
        let covered: usize = container.sections.iter().map(|s| s.len).sum();
        assert_eq!(covered, data.len());
        assert!(container
            .sections
            .windows(2)
            .all(|w| w[0].offset + w[0].len == w[1].offset));
        // Unknown frame folds into the TYPE span
        assert_eq!(container.sections[1].len, 2 * FRAME_HEADER_SIZE + 7);
        assert!(matches!(
            container.section(SectionKind::Value).unwrap().body,
            SectionBody::Binary(b) if b.len() == 4
        ));
    }

    #[test]
    fn test_binary_section_past_eof() {
        let mut data = BINARY_REVISION.to_le_bytes().to_vec();
        data.extend_from_slice(&SECTION_CODE_HEADER.to_le_bytes());
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(b"short");
        let err = read_sections(&data).unwrap_err();
        assert!(matches!(err, PsfError::MalformedContainer(_)));
    }

    #[test]
    fn test_binary_missing_end() {
        let mut data = BINARY_REVISION.to_le_bytes().to_vec();
        data.extend_from_slice(&SECTION_CODE_HEADER.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        let err = read_sections(&data).unwrap_err();
        assert!(err.to_string().contains("END"));
    }
}
