//! Fact families and their grain templates.
//!
//! A fact family is one source export (one flat file) feeding one staging
//! table and one production table. Its grain is the set of dimension keys
//! that, together with the date, identify a measurement.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator as _};

use crate::{dimension::Dimension, Error, Result};

/// Suffix appended to a production table name to obtain its staging table.
pub const STAGING_SUFFIX: &str = "_temp";

// ─── Columns ─────────────────────────────────────────────────────────────────

/// Source column labels shared by every family.
pub mod source {
  pub const DATE:     &str = "Date";
  pub const ZONE:     &str = "ZoneObservation";
  pub const ORIGIN:   &str = "Provenance";
  pub const CATEGORY: &str = "CategorieVisiteur";
  pub const VOLUME:   &str = "Volume";
  pub const REGION:   &str = "NomRegion";
}

/// How a grain column is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
  /// ISO-8601 calendar date.
  Date,
  /// Surrogate key of a dimension member; never null.
  Key,
  /// Surrogate key that may be unknown, stored as 0.
  DerivedKey,
  /// Short text label.
  Label,
  /// The non-negative measurement.
  Measure,
}

/// One column of a staging or production fact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
  pub name:   &'static str,
  pub kind:   ColumnKind,
  /// Whether the column belongs to the composite natural key.
  pub in_key: bool,
}

/// A grain-specific column beyond the fixed zone/origin/category triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrainColumn {
  Department,
  Country,
  StayDuration,
  Commune,
  /// Intermunicipal group; derived from the commune.
  Epci,
  /// Day-of-week label; derived from the date.
  Weekday,
}

impl GrainColumn {
  pub fn column(self) -> &'static str {
    match self {
      Self::Department => "id_departement",
      Self::Country => "id_pays",
      Self::StayDuration => "id_duree",
      Self::Commune => "id_commune",
      Self::Epci => "id_epci",
      Self::Weekday => "jour_semaine",
    }
  }

  /// Derived columns are functionally dependent on a key column and stay
  /// out of the composite key.
  pub fn is_key(self) -> bool { !matches!(self, Self::Epci | Self::Weekday) }

  pub fn kind(self) -> ColumnKind {
    match self {
      Self::Epci => ColumnKind::DerivedKey,
      Self::Weekday => ColumnKind::Label,
      _ => ColumnKind::Key,
    }
  }

  /// The source column carrying the raw label, if the column is read from
  /// the file at all.
  pub fn source_label(self) -> Option<&'static str> {
    match self {
      Self::Department => Some("NomDepartement"),
      Self::Country => Some("Pays"),
      Self::StayDuration => Some("DureeSejour"),
      Self::Commune => Some("ZoneMobilite"),
      Self::Epci => Some("EPCI"),
      Self::Weekday => None,
    }
  }

  /// Whether a row lacking the source column must be rejected.
  pub fn is_required(self) -> bool { self.is_key() }

  pub fn dimension(self) -> Option<Dimension> {
    match self {
      Self::Department => Some(Dimension::Department),
      Self::Country => Some(Dimension::Country),
      Self::StayDuration => Some(Dimension::StayDuration),
      Self::Commune => Some(Dimension::Commune),
      Self::Epci => Some(Dimension::Epci),
      Self::Weekday => None,
    }
  }

  fn spec(self) -> ColumnSpec {
    ColumnSpec { name: self.column(), kind: self.kind(), in_key: self.is_key() }
  }
}

// ─── Grain ───────────────────────────────────────────────────────────────────

/// Declarative grain template of a fact family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grain {
  pub extras: &'static [GrainColumn],
}

impl Grain {
  const FIXED_KEYS: [ColumnSpec; 4] = [
    ColumnSpec { name: "date", kind: ColumnKind::Date, in_key: true },
    ColumnSpec { name: "id_zone", kind: ColumnKind::Key, in_key: true },
    ColumnSpec { name: "id_provenance", kind: ColumnKind::Key, in_key: true },
    ColumnSpec { name: "id_categorie", kind: ColumnKind::Key, in_key: true },
  ];

  const VOLUME: ColumnSpec =
    ColumnSpec { name: "volume", kind: ColumnKind::Measure, in_key: false };

  /// All columns in storage order: fixed keys, grain extras, measurement.
  pub fn columns(&self) -> Vec<ColumnSpec> {
    let mut cols = Self::FIXED_KEYS.to_vec();
    cols.extend(self.extras.iter().map(|c| c.spec()));
    cols.push(Self::VOLUME);
    cols
  }

  /// Names of the columns forming the composite natural key.
  pub fn key_columns(&self) -> Vec<&'static str> {
    self
      .columns()
      .into_iter()
      .filter(|c| c.in_key)
      .map(|c| c.name)
      .collect()
  }

  pub fn has(&self, column: GrainColumn) -> bool { self.extras.contains(&column) }
}

// ─── Families ────────────────────────────────────────────────────────────────

/// The closed set of source exports handled by the pipeline.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FactFamily {
  Diurnes,
  DiurnesDepartements,
  DiurnesPays,
  Nuitees,
  NuiteesDepartements,
  NuiteesPays,
  LieuActiviteSoir,
  SejoursDuree,
  SejoursDureeDepartements,
  SejoursDureePays,
}

impl FactFamily {
  pub fn all() -> impl Iterator<Item = Self> { Self::iter() }

  pub fn slug(self) -> &'static str {
    match self {
      Self::Diurnes => "diurnes",
      Self::DiurnesDepartements => "diurnes_departements",
      Self::DiurnesPays => "diurnes_pays",
      Self::Nuitees => "nuitees",
      Self::NuiteesDepartements => "nuitees_departements",
      Self::NuiteesPays => "nuitees_pays",
      Self::LieuActiviteSoir => "lieu_activite_soir",
      Self::SejoursDuree => "sejours_duree",
      Self::SejoursDureeDepartements => "sejours_duree_departements",
      Self::SejoursDureePays => "sejours_duree_pays",
    }
  }

  /// Default name of the source export.
  pub fn default_file_name(self) -> &'static str {
    match self {
      Self::Diurnes => "frequentation_journee.csv",
      Self::DiurnesDepartements => "frequentation_journee_fr.csv",
      Self::DiurnesPays => "frequentation_journee_int.csv",
      Self::Nuitees => "frequentation_nuitee.csv",
      Self::NuiteesDepartements => "frequentation_nuitee_fr.csv",
      Self::NuiteesPays => "frequentation_nuitee_int.csv",
      Self::LieuActiviteSoir => "export_mobilite.csv",
      Self::SejoursDuree => "duree_sejour.csv",
      Self::SejoursDureeDepartements => "duree_sejour_fr.csv",
      Self::SejoursDureePays => "duree_sejour_int.csv",
    }
  }

  pub fn production_table(self) -> String { format!("fact_{}", self.slug()) }

  pub fn staging_table(self) -> String {
    format!("fact_{}{STAGING_SUFFIX}", self.slug())
  }

  pub fn grain(self) -> Grain {
    use GrainColumn::*;
    let extras: &'static [GrainColumn] = match self {
      Self::Diurnes | Self::Nuitees => &[],
      Self::DiurnesDepartements | Self::NuiteesDepartements => &[Department],
      Self::DiurnesPays | Self::NuiteesPays => &[Country],
      Self::LieuActiviteSoir => &[Commune, Epci, Weekday],
      Self::SejoursDuree => &[StayDuration],
      Self::SejoursDureeDepartements => &[StayDuration, Department],
      Self::SejoursDureePays => &[StayDuration, Country],
    };
    Grain { extras }
  }
}

impl fmt::Display for FactFamily {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.slug()) }
}

/// Accepts the family slug, its production table or its staging table.
impl FromStr for FactFamily {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let lowered = s.trim().to_ascii_lowercase();
    let name = lowered.strip_suffix(STAGING_SUFFIX).unwrap_or(&lowered);
    let name = name.strip_prefix("fact_").unwrap_or(name);
    Self::iter()
      .find(|f| f.slug() == name)
      .ok_or_else(|| Error::UnknownFamily(s.to_owned()))
  }
}
