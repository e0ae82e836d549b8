//! Encoding and decoding helpers between domain types and SQLite values.
//!
//! Dates are stored as `YYYY-MM-DD` text, timestamps as RFC 3339 strings.
//! Fact rows are bound positionally in grain-template column order.

use chrono::{DateTime, NaiveDate, Utc};
use flux_core::{
  fact::{FactRow, GrainValue},
  family::{ColumnKind, FactFamily, GrainColumn},
};
use rusqlite::types::Value;

use crate::{Error, Result};

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_date(date: NaiveDate) -> String { date.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Quote a table name for interpolation, refusing anything that is not a
/// plain `[A-Za-z0-9_]` identifier.
pub fn quote_ident(name: &str) -> Result<String> {
  let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
  if !valid {
    return Err(Error::InvalidIdentifier(name.to_owned()));
  }
  Ok(format!("\"{name}\""))
}

/// `?1, ?2, ..., ?n` starting at `first`.
pub fn placeholders(first: usize, count: usize) -> String {
  (first..first + count).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

// ─── Fact rows ───────────────────────────────────────────────────────────────

/// Bind values of a fact row, in the order of `family.grain().columns()`.
pub fn fact_values(family: FactFamily, row: &FactRow) -> Vec<Value> {
  let grain = family.grain();
  let mut values = Vec::with_capacity(grain.extras.len() + 5);
  values.push(Value::Text(encode_date(row.date)));
  values.push(Value::Integer(row.zone));
  values.push(Value::Integer(row.origin));
  values.push(Value::Integer(row.category));

  for &column in grain.extras {
    values.push(match (row.grain_value(column), column.kind()) {
      (GrainValue::Key(id), ColumnKind::DerivedKey) => Value::Integer(id.unwrap_or(0)),
      (GrainValue::Key(id), _) => id.map_or(Value::Null, Value::Integer),
      (GrainValue::Label(label), _) => label.map_or(Value::Null, |l| Value::Text(l.to_owned())),
    });
  }

  values.push(Value::Integer(row.volume));
  values
}

/// Raw values read back from a staging row, before date decoding.
pub struct RawFact {
  pub date:   String,
  pub fields: FactRow,
}

impl RawFact {
  /// Read a row selected with the columns of `family.grain().columns()`.
  pub fn from_row(family: FactFamily, row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    let grain = family.grain();
    let date: String = row.get(0)?;
    let mut fields = FactRow::new(NaiveDate::MIN, row.get(1)?, row.get(2)?, row.get(3)?, 0);

    for (offset, &column) in grain.extras.iter().enumerate() {
      let idx = 4 + offset;
      match column {
        GrainColumn::Department => fields.department = row.get(idx)?,
        GrainColumn::Country => fields.country = row.get(idx)?,
        GrainColumn::StayDuration => fields.stay_duration = row.get(idx)?,
        GrainColumn::Commune => fields.commune = row.get(idx)?,
        GrainColumn::Epci => fields.epci = row.get(idx)?,
        GrainColumn::Weekday => fields.weekday = row.get(idx)?,
      }
    }

    fields.volume = row.get(4 + grain.extras.len())?;
    Ok(Self { date, fields })
  }

  pub fn into_fact(self) -> Result<FactRow> {
    Ok(FactRow { date: decode_date(&self.date)?, ..self.fields })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quote_ident_rejects_injection() {
    assert_eq!(quote_ident("fact_diurnes").unwrap(), "\"fact_diurnes\"");
    assert!(quote_ident("fact; DROP TABLE x").is_err());
    assert!(quote_ident("").is_err());
  }

  #[test]
  fn derived_epci_defaults_to_zero() {
    let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let mut row = FactRow::new(date, 1, 2, 3, 10);
    row.commune = Some(5);
    row.weekday = Some("Lundi".into());

    let values = fact_values(FactFamily::LieuActiviteSoir, &row);
    assert_eq!(values, vec![
      Value::Text("2024-07-01".into()),
      Value::Integer(1),
      Value::Integer(2),
      Value::Integer(3),
      Value::Integer(5),
      Value::Integer(0),
      Value::Text("Lundi".into()),
      Value::Integer(10),
    ]);
  }

  #[test]
  fn placeholders_are_numbered() {
    assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
    assert_eq!(placeholders(4, 1), "?4");
  }
}
