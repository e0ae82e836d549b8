//! Text normalisation applied to raw source labels before key resolution.
//!
//! Source exports mix encodings, casing, accent usage and punctuation
//! variants for the same label. Every label goes through
//! [`normalize_label`] (whitespace, accents, case) before any alias lookup,
//! so that equal-after-normalisation labels always map to one member.

use chrono::NaiveDate;

/// Trim, fold accents to their base Latin letters, collapse internal
/// whitespace and uppercase.
pub fn normalize_label(raw: &str) -> String {
  let folded = fold_accents(raw);
  collapse_whitespace(&folded).to_uppercase()
}

/// Trim and replace every run of whitespace (including no-break spaces)
/// by a single ASCII space.
pub fn collapse_whitespace(s: &str) -> String {
  s.split(|c: char| c.is_whitespace() || c == '\u{a0}' || c == '\u{202f}')
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Replace accented Latin letters by their base letter, unify apostrophes
/// and drop double quotes.
pub fn fold_accents(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => out.push('A'),
      'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => out.push('a'),
      'Æ' => out.push_str("AE"),
      'æ' => out.push_str("ae"),
      'Ç' => out.push('C'),
      'ç' => out.push('c'),
      'È' | 'É' | 'Ê' | 'Ë' => out.push('E'),
      'è' | 'é' | 'ê' | 'ë' => out.push('e'),
      'Ì' | 'Í' | 'Î' | 'Ï' => out.push('I'),
      'ì' | 'í' | 'î' | 'ï' => out.push('i'),
      'Ð' => out.push('D'),
      'ð' => out.push('d'),
      'Ñ' => out.push('N'),
      'ñ' => out.push('n'),
      'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => out.push('O'),
      'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => out.push('o'),
      'Œ' => out.push_str("OE"),
      'œ' => out.push_str("oe"),
      'Ù' | 'Ú' | 'Û' | 'Ü' => out.push('U'),
      'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
      'Ý' | 'Ÿ' => out.push('Y'),
      'ý' | 'ÿ' => out.push('y'),
      'ß' => out.push_str("SS"),
      '\u{2018}' | '\u{2019}' | '\u{02bc}' | '\u{00b4}' | '`' => out.push('\''),
      '"' | '\u{201c}' | '\u{201d}' | '\u{00ab}' | '\u{00bb}' => {}
      '\u{2010}' | '\u{2011}' | '\u{2013}' => out.push('-'),
      other => out.push(other),
    }
  }
  out
}

// ─── Stay durations ──────────────────────────────────────────────────────────

/// A stay-duration bucket label in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationLabel {
  pub label:  String,
  /// Nights in the bucket; `None` for open-ended buckets and unparsed
  /// labels.
  pub nights: Option<u32>,
}

const NIGHT_UNITS: [&str; 6] = ["", "N", "NUIT", "NUITS", "NUITEE", "NUITEES"];

/// Canonicalise numeric/unit variants of a duration bucket (`3N`,
/// `3 nuits`, `3 NUITÉES`) to one label (`3 NUITS`). Labels that do not
/// start with a number of nights are returned normalised but otherwise
/// untouched.
pub fn normalize_duration(raw: &str) -> DurationLabel {
  let normalized = normalize_label(raw);
  let digits: String = normalized.chars().take_while(char::is_ascii_digit).collect();
  let Ok(count) = digits.parse::<u32>() else {
    return DurationLabel { label: normalized, nights: None };
  };

  let rest = normalized[digits.len()..].trim();
  let open_ended = rest.contains('+') || rest.ends_with("ET PLUS");
  let unit = rest
    .trim_end_matches("ET PLUS")
    .replace('+', "")
    .trim()
    .to_owned();
  if !NIGHT_UNITS.contains(&unit.as_str()) {
    return DurationLabel { label: normalized, nights: None };
  }

  if open_ended {
    DurationLabel { label: format!("{count} NUITS ET PLUS"), nights: None }
  } else if count <= 1 {
    DurationLabel { label: format!("{count} NUIT"), nights: Some(count) }
  } else {
    DurationLabel { label: format!("{count} NUITS"), nights: Some(count) }
  }
}

// ─── Dates ───────────────────────────────────────────────────────────────────

/// Parse a source date: `YYYY-MM-DD` (optionally followed by a time part)
/// or `DD/MM/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
  let raw = raw.trim();
  let day_part = match raw.char_indices().nth(10) {
    Some((idx, ' ' | 'T')) => &raw[..idx],
    _ => raw,
  };
  NaiveDate::parse_from_str(day_part, "%Y-%m-%d")
    .or_else(|_| NaiveDate::parse_from_str(day_part, "%d/%m/%Y"))
    .ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn folds_accents_and_case() {
    assert_eq!(normalize_label("Châtaigneraie"), "CHATAIGNERAIE");
    assert_eq!(normalize_label("  Val   Truyère "), "VAL TRUYERE");
    assert_eq!(normalize_label("Résident"), "RESIDENT");
  }

  #[test]
  fn unifies_apostrophes_and_quotes() {
    assert_eq!(normalize_label("Pays d\u{2019}Aurillac"), "PAYS D'AURILLAC");
    assert_eq!(normalize_label("\"Corée du Sud\""), "COREE DU SUD");
    assert_eq!(normalize_label("Puy\u{a0}de\u{a0}Dôme"), "PUY DE DOME");
  }

  #[test]
  fn duration_variants_collapse() {
    assert_eq!(normalize_duration("3N").label, "3 NUITS");
    assert_eq!(normalize_duration("3 nuits").label, "3 NUITS");
    assert_eq!(normalize_duration("1 NUITS").label, "1 NUIT");
    assert_eq!(normalize_duration("1 nuitée").nights, Some(1));

    let open = normalize_duration("13 nuits et plus");
    assert_eq!(open.label, "13 NUITS ET PLUS");
    assert_eq!(open.nights, None);
    assert_eq!(normalize_duration("13N+").label, "13 NUITS ET PLUS");
  }

  #[test]
  fn unknown_duration_kept_as_is() {
    assert_eq!(normalize_duration("3 jours").label, "3 JOURS");
    assert_eq!(normalize_duration("Indéterminé").label, "INDETERMINE");
  }

  #[test]
  fn parses_both_date_layouts() {
    let expected = NaiveDate::from_ymd_opt(2024, 7, 1);
    assert_eq!(parse_date("2024-07-01"), expected);
    assert_eq!(parse_date("01/07/2024"), expected);
    assert_eq!(parse_date("2024-07-01 00:00:00"), expected);
    assert_eq!(parse_date("2024-13-01"), None);
    assert_eq!(parse_date(""), None);
  }
}
