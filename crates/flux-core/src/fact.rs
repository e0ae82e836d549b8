//! Dimension-mapped fact rows, ready for staging.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::family::GrainColumn;

/// A fact row whose natural-language labels have all been resolved to
/// surrogate keys. Which optional keys are set depends on the family's
/// grain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRow {
  pub date:          NaiveDate,
  pub zone:          i64,
  pub origin:        i64,
  pub category:      i64,
  pub department:    Option<i64>,
  pub country:       Option<i64>,
  pub stay_duration: Option<i64>,
  pub commune:       Option<i64>,
  pub epci:          Option<i64>,
  pub weekday:       Option<String>,
  pub volume:        i64,
}

/// The composite natural key of a fact row. Derived attributes (EPCI,
/// weekday) and the measurement are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
  pub date:          NaiveDate,
  pub zone:          i64,
  pub origin:        i64,
  pub category:      i64,
  pub department:    Option<i64>,
  pub country:       Option<i64>,
  pub stay_duration: Option<i64>,
  pub commune:       Option<i64>,
}

/// The value held by one grain-specific column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrainValue<'a> {
  Key(Option<i64>),
  Label(Option<&'a str>),
}

impl FactRow {
  pub fn new(date: NaiveDate, zone: i64, origin: i64, category: i64, volume: i64) -> Self {
    Self {
      date,
      zone,
      origin,
      category,
      department: None,
      country: None,
      stay_duration: None,
      commune: None,
      epci: None,
      weekday: None,
      volume,
    }
  }

  pub fn natural_key(&self) -> NaturalKey {
    NaturalKey {
      date:          self.date,
      zone:          self.zone,
      origin:        self.origin,
      category:      self.category,
      department:    self.department,
      country:       self.country,
      stay_duration: self.stay_duration,
      commune:       self.commune,
    }
  }

  pub fn grain_value(&self, column: GrainColumn) -> GrainValue<'_> {
    match column {
      GrainColumn::Department => GrainValue::Key(self.department),
      GrainColumn::Country => GrainValue::Key(self.country),
      GrainColumn::StayDuration => GrainValue::Key(self.stay_duration),
      GrainColumn::Commune => GrainValue::Key(self.commune),
      GrainColumn::Epci => GrainValue::Key(self.epci),
      GrainColumn::Weekday => GrainValue::Label(self.weekday.as_deref()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn natural_key_ignores_derived_attributes_and_volume() {
    let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let mut a = FactRow::new(date, 1, 2, 3, 42);
    a.commune = Some(7);
    let mut b = a.clone();
    b.epci = Some(4);
    b.weekday = Some("Lundi".into());
    b.volume = 99;
    assert_eq!(a.natural_key(), b.natural_key());

    b.commune = Some(8);
    assert_ne!(a.natural_key(), b.natural_key());
  }
}
