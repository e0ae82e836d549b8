//! Row parser for the `;`-separated source exports.
//!
//! Content is transcoded to UTF-8 before splitting: valid UTF-8 (with or
//! without BOM) is taken as is, anything else is decoded as Windows-1252,
//! the superset of ISO-8859-1 the exports use in practice.

use encoding_rs::WINDOWS_1252;
use flux_core::report::{RejectedRow, RejectionReason, SourceEncoding};

use crate::Result;

/// Longest excerpt kept for a rejected row.
pub const EXCERPT_LEN: usize = 160;

/// One data line, with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
  pub line:   usize,
  pub fields: Vec<String>,
}

impl SourceRecord {
  pub fn excerpt(&self) -> String { excerpt(&self.fields) }
}

#[derive(Debug, Clone)]
pub struct ParsedFile {
  pub encoding:  SourceEncoding,
  pub header:    Vec<String>,
  /// Data rows whose field count matches the header.
  pub records:   Vec<SourceRecord>,
  /// Data rows with the wrong field count, already classified.
  pub malformed: Vec<RejectedRow>,
}

impl ParsedFile {
  /// Data rows read, well-formed or not.
  pub fn rows_read(&self) -> u64 { (self.records.len() + self.malformed.len()) as u64 }
}

/// Transcode raw file content to UTF-8.
pub fn decode(bytes: &[u8]) -> (String, SourceEncoding) {
  let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
  match std::str::from_utf8(bytes) {
    Ok(s) => (s.to_owned(), SourceEncoding::Utf8),
    Err(_) => {
      let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
      (text.into_owned(), SourceEncoding::Windows1252)
    }
  }
}

/// Split content into header and data rows. The first non-blank line is the
/// header; blank lines are skipped; rows whose field count differs from the
/// header's are reported as malformed.
pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedFile> {
  let (text, encoding) = decode(bytes);

  let mut reader = csv::ReaderBuilder::new()
    .delimiter(b';')
    .has_headers(false)
    .flexible(true)
    .trim(csv::Trim::All)
    .from_reader(text.as_bytes());

  let mut header: Option<Vec<String>> = None;
  let mut records = Vec::new();
  let mut malformed = Vec::new();

  for result in reader.records() {
    let record = result?;
    if record.iter().all(str::is_empty) && record.len() <= 1 {
      continue;
    }
    let line = record.position().map_or(0, |p| p.line() as usize);
    let fields: Vec<String> = record.iter().map(str::to_owned).collect();

    let Some(expected) = header.as_ref().map(Vec::len) else {
      header = Some(fields);
      continue;
    };

    if fields.len() == expected {
      records.push(SourceRecord { line, fields });
    } else {
      malformed.push(RejectedRow {
        line,
        reason: RejectionReason::Malformed { expected, found: fields.len() },
        excerpt: excerpt(&fields),
      });
    }
  }

  Ok(ParsedFile { encoding, header: header.unwrap_or_default(), records, malformed })
}

fn excerpt(fields: &[String]) -> String {
  let joined = fields.join(";");
  match joined.char_indices().nth(EXCERPT_LEN) {
    Some((idx, _)) => format!("{}…", &joined[..idx]),
    None => joined,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_header_and_rows() {
    let parsed = parse_bytes(
      b"Date;ZoneObservation;Provenance;CategorieVisiteur;Volume\n\
        2024-07-01;CANTAL;NONLOCAL;TOURISTE;42\n",
    )
    .unwrap();
    assert_eq!(parsed.encoding, SourceEncoding::Utf8);
    assert_eq!(parsed.header[1], "ZoneObservation");
    assert_eq!(parsed.records.len(), 1);
    assert_eq!(parsed.records[0].line, 2);
    assert_eq!(parsed.records[0].fields[4], "42");
    assert!(parsed.malformed.is_empty());
  }

  #[test]
  fn skips_blank_lines_and_counts_malformed() {
    let parsed = parse_bytes(
      b"\n  \nDate;Zone;Volume\n2024-07-01;A;1\n\n2024-07-02;B\n2024-07-03;C;3;extra\n",
    )
    .unwrap();
    assert_eq!(parsed.header, ["Date", "Zone", "Volume"]);
    assert_eq!(parsed.records.len(), 1);
    assert_eq!(parsed.malformed.len(), 2);
    assert_eq!(parsed.rows_read(), 3);
    assert_eq!(parsed.malformed[0].reason, RejectionReason::Malformed {
      expected: 3,
      found:    2,
    });
  }

  #[test]
  fn decodes_legacy_encoding() {
    let parsed = parse_bytes(b"Zone;Volume\nCh\xE2taigneraie;3\n").unwrap();
    assert_eq!(parsed.encoding, SourceEncoding::Windows1252);
    assert_eq!(parsed.records[0].fields[0], "Châtaigneraie");
  }

  #[test]
  fn strips_utf8_bom_and_trims_fields() {
    let parsed = parse_bytes("\u{feff}Date ; Volume\r\n 2024-07-01 ; 5 \r\n".as_bytes()).unwrap();
    assert_eq!(parsed.header, ["Date", "Volume"]);
    assert_eq!(parsed.records[0].fields, ["2024-07-01", "5"]);
  }

  #[test]
  fn empty_content_has_no_header() {
    let parsed = parse_bytes(b"").unwrap();
    assert!(parsed.header.is_empty());
    assert_eq!(parsed.rows_read(), 0);
  }
}
