//! Dimensions of the star schema and the members the resolver creates.

use std::fmt;

use chrono::{Datelike as _, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator as _};

/// A natural-key type with its own dimension table.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
  Date,
  Zone,
  Origin,
  Category,
  Department,
  Country,
  Commune,
  Epci,
  StayDuration,
}

impl Dimension {
  pub fn all() -> impl Iterator<Item = Self> { Self::iter() }

  pub fn slug(self) -> &'static str {
    match self {
      Self::Date => "date",
      Self::Zone => "zone",
      Self::Origin => "origin",
      Self::Category => "category",
      Self::Department => "department",
      Self::Country => "country",
      Self::Commune => "commune",
      Self::Epci => "epci",
      Self::StayDuration => "stay_duration",
    }
  }

  pub fn table(self) -> &'static str {
    match self {
      Self::Date => "dim_dates",
      Self::Zone => "dim_zones_observation",
      Self::Origin => "dim_provenances",
      Self::Category => "dim_categories_visiteur",
      Self::Department => "dim_departements",
      Self::Country => "dim_pays",
      Self::Commune => "dim_communes",
      Self::Epci => "dim_epci",
      Self::StayDuration => "dim_durees_sejour",
    }
  }

  /// Surrogate key column.
  pub fn id_column(self) -> &'static str {
    match self {
      Self::Date => "id_date",
      Self::Zone => "id_zone",
      Self::Origin => "id_provenance",
      Self::Category => "id_categorie",
      Self::Department => "id_departement",
      Self::Country => "id_pays",
      Self::Commune => "id_commune",
      Self::Epci => "id_epci",
      Self::StayDuration => "id_duree",
    }
  }

  /// Unique natural-key column.
  pub fn label_column(self) -> &'static str {
    match self {
      Self::Date => "date",
      Self::Zone => "nom_zone",
      Self::Origin => "nom_provenance",
      Self::Category => "nom_categorie",
      Self::Department => "nom_departement",
      Self::Country => "nom_pays",
      Self::Commune => "nom_commune",
      Self::Epci => "nom_epci",
      Self::StayDuration => "libelle",
    }
  }
}

impl fmt::Display for Dimension {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.slug()) }
}

// ─── Calendar ────────────────────────────────────────────────────────────────

/// Attributes of a `dim_dates` member, all derived from the date itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
  pub date:     NaiveDate,
  pub weekday:  &'static str,
  pub month:    u32,
  pub year:     i32,
  pub quarter:  u32,
  pub iso_week: u32,
}

impl CalendarDay {
  pub fn new(date: NaiveDate) -> Self {
    Self {
      date,
      weekday:  weekday_label(date.weekday()),
      month:    date.month(),
      year:     date.year(),
      quarter:  (date.month() - 1) / 3 + 1,
      iso_week: date.iso_week().week(),
    }
  }
}

/// French weekday label, as used in the source exports and reports.
pub fn weekday_label(day: Weekday) -> &'static str {
  match day {
    Weekday::Mon => "Lundi",
    Weekday::Tue => "Mardi",
    Weekday::Wed => "Mercredi",
    Weekday::Thu => "Jeudi",
    Weekday::Fri => "Vendredi",
    Weekday::Sat => "Samedi",
    Weekday::Sun => "Dimanche",
  }
}

// ─── New members ─────────────────────────────────────────────────────────────

/// Auxiliary attributes stored alongside a member's natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberAttributes {
  Plain,
  Calendar(CalendarDay),
  /// Number of nights of a stay-duration bucket; `None` for open-ended
  /// buckets.
  Duration { nights: Option<u32> },
}

/// A dimension member to insert on first sight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMember {
  pub dimension:  Dimension,
  /// Canonical natural key.
  pub label:      String,
  pub attributes: MemberAttributes,
}

impl NewMember {
  pub fn plain(dimension: Dimension, label: impl Into<String>) -> Self {
    Self { dimension, label: label.into(), attributes: MemberAttributes::Plain }
  }
}
