//! SQL schema for the FluxVision SQLite store.
//!
//! Dimension tables are static. Fact tables are generated from each
//! family's grain template: production tables at open time, staging tables
//! the first time a family is loaded.

use flux_core::family::{ColumnKind, ColumnSpec, FactFamily};

/// Dimension DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS dim_dates (
    id_date      INTEGER PRIMARY KEY AUTOINCREMENT,
    date         TEXT    NOT NULL UNIQUE,   -- YYYY-MM-DD
    jour_semaine TEXT    NOT NULL,
    mois         INTEGER NOT NULL,
    annee        INTEGER NOT NULL,
    trimestre    INTEGER NOT NULL,
    semaine      INTEGER NOT NULL,          -- ISO week
    created_at   TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_zones_observation (
    id_zone    INTEGER PRIMARY KEY AUTOINCREMENT,
    nom_zone   TEXT    NOT NULL UNIQUE,
    created_at TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_provenances (
    id_provenance  INTEGER PRIMARY KEY AUTOINCREMENT,
    nom_provenance TEXT    NOT NULL UNIQUE,
    created_at     TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_categories_visiteur (
    id_categorie  INTEGER PRIMARY KEY AUTOINCREMENT,
    nom_categorie TEXT    NOT NULL UNIQUE,
    created_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_departements (
    id_departement  INTEGER PRIMARY KEY AUTOINCREMENT,
    nom_departement TEXT    NOT NULL UNIQUE,
    nom_region      TEXT,
    created_at      TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_pays (
    id_pays    INTEGER PRIMARY KEY AUTOINCREMENT,
    nom_pays   TEXT    NOT NULL UNIQUE,
    created_at TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_communes (
    id_commune     INTEGER PRIMARY KEY AUTOINCREMENT,
    nom_commune    TEXT    NOT NULL UNIQUE,
    id_departement INTEGER REFERENCES dim_departements(id_departement),
    created_at     TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS dim_epci (
    id_epci    INTEGER PRIMARY KEY AUTOINCREMENT,
    nom_epci   TEXT    NOT NULL UNIQUE,
    created_at TEXT    NOT NULL
);

-- nb_nuits is NULL for open-ended buckets.
CREATE TABLE IF NOT EXISTS dim_durees_sejour (
    id_duree   INTEGER PRIMARY KEY AUTOINCREMENT,
    libelle    TEXT    NOT NULL UNIQUE,
    nb_nuits   INTEGER,
    created_at TEXT    NOT NULL
);

PRAGMA user_version = 1;
";

fn column_ddl(spec: &ColumnSpec) -> String {
  let ty = match spec.kind {
    ColumnKind::Date => "TEXT NOT NULL",
    ColumnKind::Key => "INTEGER NOT NULL",
    ColumnKind::DerivedKey => "INTEGER NOT NULL DEFAULT 0",
    ColumnKind::Label => "TEXT",
    ColumnKind::Measure => "INTEGER NOT NULL DEFAULT 0",
  };
  format!("    {} {ty}", spec.name)
}

/// Staging table: grain columns keyed by the composite natural key.
pub fn staging_ddl(family: FactFamily) -> String {
  let grain = family.grain();
  let mut lines: Vec<String> = grain.columns().iter().map(column_ddl).collect();
  lines.push("    created_at TEXT NOT NULL".to_owned());
  lines.push(format!("    PRIMARY KEY ({})", grain.key_columns().join(", ")));
  format!(
    "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
    family.staging_table(),
    lines.join(",\n")
  )
}

/// Production table: surrogate id, grain columns, provisional flag and
/// bookkeeping timestamps, with a unique natural key.
pub fn production_ddl(family: FactFamily) -> String {
  let grain = family.grain();
  let mut lines = vec!["    id INTEGER PRIMARY KEY AUTOINCREMENT".to_owned()];
  lines.extend(grain.columns().iter().map(column_ddl));
  lines.push("    provisional INTEGER NOT NULL DEFAULT 1".to_owned());
  lines.push("    created_at TEXT NOT NULL".to_owned());
  lines.push("    updated_at TEXT NOT NULL".to_owned());
  lines.push(format!("    UNIQUE ({})", grain.key_columns().join(", ")));
  format!(
    "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
    family.production_table(),
    lines.join(",\n")
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn staging_ddl_keys_on_grain() {
    let ddl = staging_ddl(FactFamily::LieuActiviteSoir);
    assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS fact_lieu_activite_soir_temp"));
    assert!(ddl.contains("id_epci INTEGER NOT NULL DEFAULT 0"));
    assert!(ddl.contains("jour_semaine TEXT"));
    assert!(ddl.contains(
      "PRIMARY KEY (date, id_zone, id_provenance, id_categorie, id_commune)"
    ));
  }

  #[test]
  fn production_ddl_carries_provisional_flag() {
    let ddl = production_ddl(FactFamily::NuiteesPays);
    assert!(ddl.contains("provisional INTEGER NOT NULL DEFAULT 1"));
    assert!(ddl.contains("UNIQUE (date, id_zone, id_provenance, id_categorie, id_pays)"));
  }
}
