//! Integration tests for `SqliteWarehouse` against an in-memory database.

use chrono::NaiveDate;
use flux_core::{
  dimension::{CalendarDay, Dimension, MemberAttributes, NewMember},
  fact::FactRow,
  family::FactFamily,
  warehouse::{DuplicatePolicy, MergePolicy, Warehouse},
};

use crate::{Error, SqliteWarehouse};

fn store() -> SqliteWarehouse {
  SqliteWarehouse::open_in_memory().expect("in-memory store")
}

fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 7, d).unwrap() }

fn columns(family: FactFamily) -> Vec<String> {
  family.grain().columns().iter().map(|c| c.name.to_owned()).collect()
}

/// Load `rows` into staging and promote the whole table.
fn stage_and_promote(
  s:      &SqliteWarehouse,
  family: FactFamily,
  rows:   &[FactRow],
  policy: MergePolicy,
) -> flux_core::warehouse::MergeCounts {
  s.ensure_staging(family).unwrap();
  let dates: Vec<_> = rows.iter().map(|r| r.date).collect();
  s.delete_staging_dates(family, &dates).unwrap();
  s.insert_staging(family, rows, DuplicatePolicy::KeepFirst).unwrap();
  let (lo, hi) = s.row_id_bounds(&family.staging_table()).unwrap().unwrap();
  s.promote_window(family, &columns(family), lo..=hi, policy).unwrap()
}

// ─── Dimensions ──────────────────────────────────────────────────────────────

#[test]
fn insert_member_is_idempotent() {
  let s = store();
  let a = s.insert_member(&NewMember::plain(Dimension::Zone, "CANTAL")).unwrap();
  let b = s.insert_member(&NewMember::plain(Dimension::Zone, "CANTAL")).unwrap();
  assert_eq!(a, b);
  assert_eq!(s.find_member(Dimension::Zone, "CANTAL").unwrap(), Some(a));
  assert_eq!(s.count_rows("dim_zones_observation").unwrap(), 1);
}

#[test]
fn find_member_missing_returns_none() {
  let s = store();
  assert_eq!(s.find_member(Dimension::Country, "ATLANTIDE").unwrap(), None);
}

#[test]
fn calendar_member_is_keyed_by_date() {
  let s = store();
  let member = NewMember {
    dimension:  Dimension::Date,
    label:      "2024-07-01".into(),
    attributes: MemberAttributes::Calendar(CalendarDay::new(day(1))),
  };
  let id = s.insert_member(&member).unwrap();
  assert_eq!(s.find_member(Dimension::Date, "2024-07-01").unwrap(), Some(id));

  let (weekday, quarter): (String, i64) = s
    .conn
    .query_row("SELECT jour_semaine, trimestre FROM dim_dates WHERE id_date = ?1", [id], |r| {
      Ok((r.get(0)?, r.get(1)?))
    })
    .unwrap();
  assert_eq!(weekday, "Lundi");
  assert_eq!(quarter, 3);
}

#[test]
fn commune_department_link_is_first_wins() {
  let s = store();
  let commune = s.insert_member(&NewMember::plain(Dimension::Commune, "AURILLAC")).unwrap();
  let cantal = s.insert_member(&NewMember::plain(Dimension::Department, "CANTAL")).unwrap();
  let lozere = s.insert_member(&NewMember::plain(Dimension::Department, "LOZERE")).unwrap();

  assert!(s.link_commune_department(commune, cantal).unwrap());
  assert!(!s.link_commune_department(commune, lozere).unwrap());

  let linked: i64 = s
    .conn
    .query_row("SELECT id_departement FROM dim_communes WHERE id_commune = ?1", [commune], |r| {
      r.get(0)
    })
    .unwrap();
  assert_eq!(linked, cantal);
}

#[test]
fn department_region_is_filled_once() {
  let s = store();
  let dept = s.insert_member(&NewMember::plain(Dimension::Department, "CANTAL")).unwrap();
  assert!(s.enrich_department_region(dept, "AUVERGNE-RHONE-ALPES").unwrap());
  assert!(!s.enrich_department_region(dept, "OCCITANIE").unwrap());
}

#[test]
fn epci_is_inferred_from_location_facts() {
  let s = store();
  assert_eq!(s.infer_commune_epci(7).unwrap(), None);

  let family = FactFamily::LieuActiviteSoir;
  let mut row = FactRow::new(day(1), 1, 1, 1, 5);
  row.commune = Some(7);
  row.epci = Some(3);
  row.weekday = Some("Lundi".into());
  stage_and_promote(&s, family, &[row], MergePolicy::KeepExisting);

  assert_eq!(s.infer_commune_epci(7).unwrap(), Some(3));
}

// ─── Staging ─────────────────────────────────────────────────────────────────

#[test]
fn ensure_staging_creates_once() {
  let s = store();
  let family = FactFamily::SejoursDureePays;
  assert!(!s.table_exists(&family.staging_table()).unwrap());
  assert!(s.ensure_staging(family).unwrap());
  assert!(!s.ensure_staging(family).unwrap());

  let cols = s.table_columns(&family.staging_table()).unwrap();
  assert_eq!(cols, [
    "date",
    "id_zone",
    "id_provenance",
    "id_categorie",
    "id_duree",
    "id_pays",
    "volume",
    "created_at",
  ]);
}

#[test]
fn insert_staging_respects_duplicate_policy() {
  let s = store();
  let family = FactFamily::Diurnes;
  s.ensure_staging(family).unwrap();

  let first = FactRow::new(day(1), 1, 1, 1, 10);
  let second = FactRow::new(day(1), 1, 1, 1, 20);

  let written = s
    .insert_staging(family, &[first.clone(), second.clone()], DuplicatePolicy::KeepFirst)
    .unwrap();
  assert_eq!(written, 1);
  assert_eq!(s.staging_rows(family, None).unwrap()[0].volume, 10);

  s.insert_staging(family, &[second], DuplicatePolicy::KeepLast).unwrap();
  let rows = s.staging_rows(family, None).unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].volume, 20);
}

#[test]
fn delete_only_touches_listed_dates() {
  let s = store();
  let family = FactFamily::Nuitees;
  s.ensure_staging(family).unwrap();
  let rows: Vec<_> = (1..=3).map(|d| FactRow::new(day(d), 1, 1, 1, d as i64)).collect();
  s.insert_staging(family, &rows, DuplicatePolicy::KeepFirst).unwrap();

  let deleted = s.delete_staging_dates(family, &[day(2)]).unwrap();
  assert_eq!(deleted, 1);

  let left: Vec<_> = s.staging_rows(family, None).unwrap().into_iter().map(|r| r.date).collect();
  assert_eq!(left, [day(1), day(3)]);
  assert_eq!(s.delete_staging_dates(family, &[]).unwrap(), 0);
}

#[test]
fn staging_rows_round_trip_grain_extras() {
  let s = store();
  let family = FactFamily::SejoursDureeDepartements;
  s.ensure_staging(family).unwrap();

  let mut row = FactRow::new(day(4), 2, 3, 4, 99);
  row.stay_duration = Some(5);
  row.department = Some(6);
  s.insert_staging(family, &[row.clone()], DuplicatePolicy::KeepFirst).unwrap();

  assert_eq!(s.staging_rows(family, Some(5)).unwrap(), vec![row]);
}

// ─── Promotion ───────────────────────────────────────────────────────────────

#[test]
fn promotion_inserts_provisional_rows() {
  let s = store();
  let family = FactFamily::Diurnes;
  let counts = stage_and_promote(&s, family, &[FactRow::new(day(1), 1, 2, 3, 42)], MergePolicy::KeepExisting);

  assert_eq!(counts.inserted, 1);
  assert_eq!(counts.reasserted, 0);
  assert_eq!(s.count_rows("fact_diurnes").unwrap(), 1);
  assert_eq!(s.count_provisional("fact_diurnes").unwrap(), 1);
}

#[test]
fn promotion_never_deletes_confirmed_rows() {
  let s = store();
  let family = FactFamily::Diurnes;
  stage_and_promote(&s, family, &[FactRow::new(day(1), 1, 1, 1, 10)], MergePolicy::KeepExisting);
  s.conn.execute("UPDATE fact_diurnes SET provisional = 0", []).unwrap();

  // Staging now only holds a different key.
  s.conn.execute("DELETE FROM fact_diurnes_temp", []).unwrap();
  stage_and_promote(&s, family, &[FactRow::new(day(2), 1, 1, 1, 20)], MergePolicy::KeepExisting);

  let (volume, provisional): (i64, i64) = s
    .conn
    .query_row("SELECT volume, provisional FROM fact_diurnes WHERE date = '2024-07-01'", [], |r| {
      Ok((r.get(0)?, r.get(1)?))
    })
    .unwrap();
  assert_eq!((volume, provisional), (10, 0));
  assert_eq!(s.count_rows("fact_diurnes").unwrap(), 2);
}

#[test]
fn promotion_reasserts_provisional_without_overwriting() {
  let s = store();
  let family = FactFamily::Diurnes;
  stage_and_promote(&s, family, &[FactRow::new(day(1), 1, 1, 1, 10)], MergePolicy::KeepExisting);
  s.conn.execute("UPDATE fact_diurnes SET provisional = 0", []).unwrap();

  let counts =
    stage_and_promote(&s, family, &[FactRow::new(day(1), 1, 1, 1, 99)], MergePolicy::KeepExisting);
  assert_eq!(counts.inserted, 0);
  assert_eq!(counts.reasserted, 1);

  let (volume, provisional): (i64, i64) = s
    .conn
    .query_row("SELECT volume, provisional FROM fact_diurnes", [], |r| Ok((r.get(0)?, r.get(1)?)))
    .unwrap();
  assert_eq!((volume, provisional), (10, 1));
}

#[test]
fn refresh_policy_only_updates_provisional_measurements() {
  let s = store();
  let family = FactFamily::Diurnes;
  stage_and_promote(
    &s,
    family,
    &[FactRow::new(day(1), 1, 1, 1, 10), FactRow::new(day(2), 1, 1, 1, 10)],
    MergePolicy::KeepExisting,
  );
  s.conn.execute("UPDATE fact_diurnes SET provisional = 0 WHERE date = '2024-07-01'", []).unwrap();

  stage_and_promote(
    &s,
    family,
    &[FactRow::new(day(1), 1, 1, 1, 50), FactRow::new(day(2), 1, 1, 1, 50)],
    MergePolicy::RefreshProvisional,
  );

  let volumes: Vec<i64> = s
    .conn
    .prepare("SELECT volume FROM fact_diurnes ORDER BY date")
    .unwrap()
    .query_map([], |r| r.get(0))
    .unwrap()
    .collect::<rusqlite::Result<_>>()
    .unwrap();
  assert_eq!(volumes, [10, 50]);
}

#[test]
fn promote_window_rejects_foreign_columns() {
  let s = store();
  let family = FactFamily::Diurnes;
  s.ensure_staging(family).unwrap();

  let mut cols = columns(family);
  cols.push("id_pays".into());
  let err = s.promote_window(family, &cols, 1..=1, MergePolicy::KeepExisting).unwrap_err();
  assert!(matches!(err, Error::UnknownColumn { .. }));

  let cols: Vec<String> = columns(family).into_iter().filter(|c| c != "id_zone").collect();
  let err = s.promote_window(family, &cols, 1..=1, MergePolicy::KeepExisting).unwrap_err();
  assert!(matches!(err, Error::MissingKeyColumn { .. }));
}

#[test]
fn provisional_column_is_added_to_legacy_tables() {
  let s = store();
  s.conn
    .execute_batch(
      "DROP TABLE fact_nuitees;
       CREATE TABLE fact_nuitees (
           id INTEGER PRIMARY KEY AUTOINCREMENT,
           date TEXT NOT NULL,
           id_zone INTEGER NOT NULL,
           id_provenance INTEGER NOT NULL,
           id_categorie INTEGER NOT NULL,
           volume INTEGER NOT NULL DEFAULT 0,
           UNIQUE (date, id_zone, id_provenance, id_categorie)
       );
       INSERT INTO fact_nuitees (date, id_zone, id_provenance, id_categorie, volume)
       VALUES ('2024-06-30', 1, 1, 1, 7);",
    )
    .unwrap();

  assert!(s.ensure_provisional_column("fact_nuitees").unwrap());
  assert!(!s.ensure_provisional_column("fact_nuitees").unwrap());
  assert_eq!(s.count_provisional("fact_nuitees").unwrap(), 0);

  let counts = stage_and_promote(
    &s,
    FactFamily::Nuitees,
    &[FactRow::new(day(1), 1, 1, 1, 3)],
    MergePolicy::KeepExisting,
  );
  assert_eq!(counts.inserted, 1);
  assert_eq!(s.count_provisional("fact_nuitees").unwrap(), 1);
}

#[test]
fn count_rows_rejects_bad_identifiers() {
  let s = store();
  assert!(matches!(s.count_rows("x; DROP TABLE dim_pays"), Err(Error::InvalidIdentifier(_))));
  assert_eq!(s.row_id_bounds("dim_pays").unwrap(), None);
}
