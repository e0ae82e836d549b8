//! Static alias tables mapping label variants to canonical natural keys.
//!
//! Keys and values are stored in normalised form (see
//! [`normalize_label`]); lookups must be made with an already-normalised
//! label. Tables are read-only once built; extra entries come from
//! deployment configuration.

use std::collections::HashMap;

use crate::{dimension::Dimension, normalize::normalize_label};

const ZONE: &[(&str, &str)] = &[
  ("PAYS D AURILLAC", "PAYS D'AURILLAC"),
  ("PAYS DAURILLAC", "PAYS D'AURILLAC"),
  ("PAYS D\u{fffd}AURILLAC", "PAYS D'AURILLAC"),
  ("PAYS D?AURILLAC", "PAYS D'AURILLAC"),
  ("CH\u{fffd}TAIGNERAIE", "CHATAIGNERAIE"),
  ("CH?TAIGNERAIE", "CHATAIGNERAIE"),
  ("VAL TRUY\u{fffd}RE", "VAL TRUYERE"),
  ("VAL TRUY?RE", "VAL TRUYERE"),
];

const ORIGIN: &[(&str, &str)] = &[
  ("NON LOCAL", "NONLOCAL"),
  ("NON-LOCAL", "NONLOCAL"),
  ("STRANGER", "ETRANGER"),
  ("INTERNATIONAL", "ETRANGER"),
];

const CATEGORY: &[(&str, &str)] = &[
  ("TOURISTES", "TOURISTE"),
  ("EXCURSIONNISTES", "EXCURSIONNISTE"),
  ("EXCURSIONNISTE RECURENT", "EXCURSIONNISTE RECURRENT"),
];

const DEPARTMENT: &[(&str, &str)] = &[
  ("Z_AUTRE 97", "AUTRE 97"),
  ("Z_AUTRE 98", "AUTRE 98"),
  ("PUY DE DOME", "PUY-DE-DOME"),
];

const COUNTRY: &[(&str, &str)] = &[
  ("USA", "ETATS-UNIS"),
  ("ETATS UNIS", "ETATS-UNIS"),
  ("ROYAUME UNI", "ROYAUME-UNI"),
  ("COTE D IVOIRE", "COTE D'IVOIRE"),
];

const COMMUNE: &[(&str, &str)] = &[("AGEN D'AVEYRON", "AGEN-D'AVEYRON")];

const STAY_DURATION: &[(&str, &str)] = &[];

fn builtin_entries(dimension: Dimension) -> &'static [(&'static str, &'static str)] {
  match dimension {
    Dimension::Zone => ZONE,
    Dimension::Origin => ORIGIN,
    Dimension::Category => CATEGORY,
    Dimension::Department => DEPARTMENT,
    Dimension::Country => COUNTRY,
    Dimension::Commune => COMMUNE,
    Dimension::StayDuration => STAY_DURATION,
    Dimension::Date | Dimension::Epci => &[],
  }
}

/// Raw-variant → canonical mapping for one dimension.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
  entries: HashMap<String, String>,
}

impl AliasTable {
  pub fn builtin(dimension: Dimension) -> Self {
    let entries = builtin_entries(dimension)
      .iter()
      .map(|(from, to)| ((*from).to_owned(), (*to).to_owned()))
      .collect();
    Self { entries }
  }

  /// Add deployment-provided entries; both sides are normalised first and
  /// override built-in entries with the same key.
  pub fn extend<I, K, V>(&mut self, extra: I)
  where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
  {
    for (from, to) in extra {
      self
        .entries
        .insert(normalize_label(from.as_ref()), normalize_label(to.as_ref()));
    }
  }

  /// Canonical form of an already-normalised label.
  pub fn canonical<'a>(&'a self, normalized: &'a str) -> &'a str {
    self.entries.get(normalized).map_or(normalized, String::as_str)
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

/// Expand the `ST`/`STE` abbreviations of French place names
/// (`ST-FLOUR` → `SAINT-FLOUR`). Expects a normalised label.
pub fn expand_saint_abbreviations(normalized: &str) -> String {
  let mut out = String::with_capacity(normalized.len() + 8);
  let mut token = String::new();
  let flush = |token: &mut String, out: &mut String| {
    match token.as_str() {
      "ST" => out.push_str("SAINT"),
      "STE" => out.push_str("SAINTE"),
      _ => out.push_str(token),
    }
    token.clear();
  };
  for c in normalized.chars() {
    if c == ' ' || c == '-' {
      flush(&mut token, &mut out);
      out.push(c);
    } else {
      token.push(c);
    }
  }
  flush(&mut token, &mut out);
  out
}
