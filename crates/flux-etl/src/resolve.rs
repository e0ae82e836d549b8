//! Dimension resolution: raw labels to surrogate keys.
//!
//! All run-scoped state lives in [`RunContext`], created per invocation and
//! passed by `&mut` into every resolution. Only successful resolutions are
//! cached; a failure leaves the label unresolved and the owning row is
//! rejected by the caller.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use flux_core::{
  alias::{expand_saint_abbreviations, AliasTable},
  dimension::{CalendarDay, Dimension, MemberAttributes, NewMember},
  normalize::{collapse_whitespace, normalize_duration, normalize_label},
  report::DimensionCounters,
  warehouse::Warehouse,
};
use tracing::{debug, warn};

/// Per-run caches and counters.
#[derive(Debug, Default)]
pub struct RunContext {
  aliases:              BTreeMap<Dimension, AliasTable>,
  cache:                HashMap<(Dimension, String), i64>,
  epci_by_commune:      HashMap<i64, i64>,
  linked_communes:      HashSet<i64>,
  enriched_departments: HashSet<i64>,
  counters:             BTreeMap<Dimension, DimensionCounters>,
}

impl RunContext {
  pub fn new(aliases: BTreeMap<Dimension, AliasTable>) -> Self {
    Self { aliases, ..Self::default() }
  }

  pub fn counters(&self) -> &BTreeMap<Dimension, DimensionCounters> { &self.counters }

  fn counter(&mut self, dimension: Dimension) -> &mut DimensionCounters {
    self.counters.entry(dimension).or_default()
  }

  /// Canonical natural key of a raw label: normalised, abbreviation-expanded
  /// for communes, then mapped through the dimension's alias table. `None`
  /// for labels that normalise to nothing.
  pub fn canonical_label(&self, dimension: Dimension, raw: &str) -> Option<String> {
    let normalized = match dimension {
      Dimension::StayDuration => normalize_duration(raw).label,
      Dimension::Commune => expand_saint_abbreviations(&normalize_label(raw)),
      _ => normalize_label(raw),
    };
    if normalized.is_empty() {
      return None;
    }
    let canonical = match self.aliases.get(&dimension) {
      Some(table) => table.canonical(&normalized).to_owned(),
      None => normalized,
    };
    Some(canonical)
  }

  /// Resolve a raw label to its surrogate key, creating the member on first
  /// sight.
  pub fn resolve<W: Warehouse>(&mut self, store: &W, dimension: Dimension, raw: &str) -> Option<i64> {
    let Some(label) = self.canonical_label(dimension, raw) else {
      self.counter(dimension).unresolved += 1;
      return None;
    };
    let member = match dimension {
      Dimension::StayDuration => NewMember {
        dimension,
        attributes: MemberAttributes::Duration { nights: normalize_duration(&label).nights },
        label,
      },
      _ => NewMember::plain(dimension, label),
    };
    self.lookup_or_create(store, member)
  }

  /// Ensure the calendar member of `date` exists and return its key.
  pub fn resolve_date<W: Warehouse>(&mut self, store: &W, date: NaiveDate) -> Option<i64> {
    let member = NewMember {
      dimension:  Dimension::Date,
      label:      date.format("%Y-%m-%d").to_string(),
      attributes: MemberAttributes::Calendar(CalendarDay::new(date)),
    };
    self.lookup_or_create(store, member)
  }

  fn lookup_or_create<W: Warehouse>(&mut self, store: &W, member: NewMember) -> Option<i64> {
    let dimension = member.dimension;
    let key = (dimension, member.label.clone());
    if let Some(&id) = self.cache.get(&key) {
      self.counter(dimension).cache_hits += 1;
      return Some(id);
    }

    self.counter(dimension).lookups += 1;
    let found = match store.find_member(dimension, &member.label) {
      Ok(found) => found,
      Err(e) => {
        warn!(%dimension, label = %member.label, error = %e, "dimension lookup failed");
        None
      }
    };

    let id = match found {
      Some(id) => Some(id),
      None => match store.insert_member(&member) {
        Ok(id) => {
          self.counter(dimension).created += 1;
          debug!(%dimension, label = %member.label, id, "new dimension member");
          Some(id)
        }
        Err(e) => {
          warn!(%dimension, label = %member.label, error = %e, "dimension member creation failed");
          None
        }
      },
    };

    match id {
      Some(id) => {
        self.cache.insert(key, id);
      }
      None => self.counter(dimension).unresolved += 1,
    }
    id
  }

  // ── Compound resolutions ──────────────────────────────────────────────────

  /// Intermunicipal group of a commune: resolved by label when the row
  /// carries one, otherwise inferred from loaded location facts, else 0.
  pub fn resolve_epci<W: Warehouse>(&mut self, store: &W, commune: i64, raw: Option<&str>) -> i64 {
    if let Some(raw) = raw.filter(|r| !r.trim().is_empty()) {
      let id = self.resolve(store, Dimension::Epci, raw).unwrap_or(0);
      self.epci_by_commune.insert(commune, id);
      return id;
    }
    if let Some(&id) = self.epci_by_commune.get(&commune) {
      return id;
    }

    let id = match store.infer_commune_epci(commune) {
      Ok(id) => id.unwrap_or(0),
      Err(e) => {
        warn!(commune, error = %e, "epci inference failed");
        0
      }
    };
    self.epci_by_commune.insert(commune, id);
    id
  }

  /// Link a commune to its parent department; the first link wins.
  pub fn link_commune<W: Warehouse>(&mut self, store: &W, commune: i64, department: i64) {
    if !self.linked_communes.insert(commune) {
      return;
    }
    match store.link_commune_department(commune, department) {
      Ok(true) => debug!(commune, department, "linked commune to department"),
      Ok(false) => {}
      Err(e) => warn!(commune, department, error = %e, "commune link failed"),
    }
  }

  /// Fill a department's region once per run, if the store has none.
  pub fn enrich_department<W: Warehouse>(&mut self, store: &W, department: i64, raw_region: &str) {
    let region = collapse_whitespace(raw_region.trim());
    if region.is_empty() || !self.enriched_departments.insert(department) {
      return;
    }
    if let Err(e) = store.enrich_department_region(department, &region) {
      warn!(department, error = %e, "department region enrichment failed");
    }
  }
}

#[cfg(test)]
mod tests {
  use flux_store_sqlite::SqliteWarehouse;

  use super::*;

  fn context() -> RunContext {
    RunContext::new(Dimension::all().map(|d| (d, AliasTable::builtin(d))).collect())
  }

  #[test]
  fn same_label_in_any_form_resolves_once() {
    let store = SqliteWarehouse::open_in_memory().unwrap();
    let mut ctx = context();

    let a = ctx.resolve(&store, Dimension::Zone, "Châtaigneraie").unwrap();
    let b = ctx.resolve(&store, Dimension::Zone, "  chataigneraie ").unwrap();
    let c = ctx.resolve(&store, Dimension::Zone, "CH\u{fffd}TAIGNERAIE").unwrap();
    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_eq!(store.count_rows("dim_zones_observation").unwrap(), 1);

    let counters = ctx.counters()[&Dimension::Zone];
    assert_eq!(counters.created, 1);
    assert!(counters.cache_hits >= 1);
  }

  #[test]
  fn new_context_reuses_stored_members() {
    let store = SqliteWarehouse::open_in_memory().unwrap();
    let first = context().resolve(&store, Dimension::Origin, "Non Local").unwrap();

    let mut ctx = context();
    let second = ctx.resolve(&store, Dimension::Origin, "NONLOCAL").unwrap();
    assert_eq!(first, second);
    assert_eq!(ctx.counters()[&Dimension::Origin].lookups, 1);
    assert_eq!(ctx.counters()[&Dimension::Origin].created, 0);
  }

  #[test]
  fn duration_variants_share_a_member() {
    let store = SqliteWarehouse::open_in_memory().unwrap();
    let mut ctx = context();
    let a = ctx.resolve(&store, Dimension::StayDuration, "3N").unwrap();
    let b = ctx.resolve(&store, Dimension::StayDuration, "3 nuits").unwrap();
    assert_eq!(a, b);
    assert_eq!(store.find_member(Dimension::StayDuration, "3 NUITS").unwrap(), Some(a));
  }

  #[test]
  fn commune_abbreviations_are_expanded() {
    let ctx = context();
    assert_eq!(
      ctx.canonical_label(Dimension::Commune, "St-Flour").as_deref(),
      Some("SAINT-FLOUR")
    );
    assert_eq!(ctx.canonical_label(Dimension::Zone, "   "), None);
  }

  #[test]
  fn blank_label_is_unresolved() {
    let store = SqliteWarehouse::open_in_memory().unwrap();
    let mut ctx = context();
    assert_eq!(ctx.resolve(&store, Dimension::Country, " "), None);
    assert_eq!(ctx.counters()[&Dimension::Country].unresolved, 1);
  }

  #[test]
  fn calendar_member_is_created_once() {
    let store = SqliteWarehouse::open_in_memory().unwrap();
    let mut ctx = context();
    let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let a = ctx.resolve_date(&store, date).unwrap();
    let b = ctx.resolve_date(&store, date).unwrap();
    assert_eq!(a, b);
    assert_eq!(store.count_rows("dim_dates").unwrap(), 1);
  }

  #[test]
  fn epci_defaults_to_zero_without_history() {
    let store = SqliteWarehouse::open_in_memory().unwrap();
    let mut ctx = context();
    assert_eq!(ctx.resolve_epci(&store, 42, None), 0);

    let named = ctx.resolve_epci(&store, 43, Some("CA du Bassin d'Aurillac"));
    assert!(named > 0);
    assert_eq!(ctx.resolve_epci(&store, 43, None), named);
  }
}
