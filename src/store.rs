//! The relational store: all entity tables plus their derived indices.

use std::collections::BTreeMap;

use crate::error::IndexBuildError;
use crate::index::{INDEX_SPECS, Index, IndexSpec, build_indices};
use crate::schema::{
    Agency, Calendar, CalendarDate, Record, Route, Shape, Stop, StopTime, Table, Trip, Value,
};

/// The normalized entity tables of one feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub agency: Vec<Agency>,
    pub routes: Vec<Route>,
    pub trips: Vec<Trip>,
    pub stops: Vec<Stop>,
    pub stop_times: Vec<StopTime>,
    pub calendar: Vec<Calendar>,
    pub calendar_dates: Vec<CalendarDate>,
    pub shapes: Vec<Shape>,
}

impl Tables {
    pub fn row_count(&self, table: Table) -> usize {
        match table {
            Table::Agency => self.agency.len(),
            Table::Routes => self.routes.len(),
            Table::Trips => self.trips.len(),
            Table::Stops => self.stops.len(),
            Table::StopTimes => self.stop_times.len(),
            Table::Calendar => self.calendar.len(),
            Table::CalendarDates => self.calendar_dates.len(),
            Table::Shapes => self.shapes.len(),
        }
    }

    /// Every row of `table` as values in declared column order, in source order.
    pub fn rows(&self, table: Table) -> Vec<Vec<Value>> {
        match table {
            Table::Agency => to_rows(&self.agency),
            Table::Routes => to_rows(&self.routes),
            Table::Trips => to_rows(&self.trips),
            Table::Stops => to_rows(&self.stops),
            Table::StopTimes => to_rows(&self.stop_times),
            Table::Calendar => to_rows(&self.calendar),
            Table::CalendarDates => to_rows(&self.calendar_dates),
            Table::Shapes => to_rows(&self.shapes),
        }
    }

    /// Row counts for all eight tables, keyed by table name.
    pub fn entity_counts(&self) -> BTreeMap<String, u64> {
        Table::ALL
            .into_iter()
            .map(|table| (table.name().to_string(), self.row_count(table) as u64))
            .collect()
    }
}

fn to_rows<R: Record>(records: &[R]) -> Vec<Vec<Value>> {
    records.iter().map(Record::values).collect()
}

/// Tables plus the indices declared in [`INDEX_SPECS`].
///
/// Indices carry no state of their own; [`RelationalStore::build`] can
/// always recreate them from the tables.
#[derive(Debug, Clone)]
pub struct RelationalStore {
    tables: Tables,
    indices: Vec<Index>,
}

impl RelationalStore {
    pub fn build(tables: Tables) -> Result<Self, IndexBuildError> {
        Self::build_with(tables, INDEX_SPECS)
    }

    pub fn build_with(tables: Tables, specs: &[IndexSpec]) -> Result<Self, IndexBuildError> {
        let indices = build_indices(&tables, specs)?;
        Ok(Self { tables, indices })
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indices.iter().find(|i| i.spec().name == name)
    }

    pub fn entity_counts(&self) -> BTreeMap<String, u64> {
        self.tables.entity_counts()
    }

    /// Stop times of `trip_id`, in source order.
    pub fn stop_times_for_trip(&self, trip_id: &str) -> Vec<&StopTime> {
        self.rows_via("idx_stop_times_trip_id", trip_id, &self.tables.stop_times)
    }

    /// Stop times serving `stop_id`, in source order.
    pub fn stop_times_at_stop(&self, stop_id: &str) -> Vec<&StopTime> {
        self.rows_via("idx_stop_times_stop_id", stop_id, &self.tables.stop_times)
    }

    /// Trips of `route_id`, in source order.
    pub fn trips_for_route(&self, route_id: &str) -> Vec<&Trip> {
        self.rows_via("idx_trips_route_id", route_id, &self.tables.trips)
    }

    fn rows_via<'a, R>(&self, index: &str, key: &str, rows: &'a [R]) -> Vec<&'a R> {
        self.index(index)
            .map(|i| i.lookup(key).iter().filter_map(|&pos| rows.get(pos)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tables() -> Tables {
        Tables {
            routes: vec![Route {
                route_id: "A".into(),
                ..Default::default()
            }],
            trips: vec![
                Trip {
                    trip_id: "T1".into(),
                    route_id: "A".into(),
                    ..Default::default()
                },
                Trip {
                    trip_id: "T2".into(),
                    route_id: "A".into(),
                    ..Default::default()
                },
            ],
            stop_times: vec![
                StopTime {
                    trip_id: "T1".into(),
                    stop_id: "1".into(),
                    stop_sequence: 1,
                    ..Default::default()
                },
                StopTime {
                    trip_id: "T2".into(),
                    stop_id: "1".into(),
                    stop_sequence: 1,
                    ..Default::default()
                },
                StopTime {
                    trip_id: "T1".into(),
                    stop_id: "2".into(),
                    stop_sequence: 2,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_entity_counts_cover_all_tables() {
        let counts = sample_tables().entity_counts();
        assert_eq!(counts.len(), 8);
        assert_eq!(counts["trips"], 2);
        assert_eq!(counts["stop_times"], 3);
        assert_eq!(counts["shapes"], 0);
    }

    #[test]
    fn test_join_helpers_follow_indices() {
        let store = RelationalStore::build(sample_tables()).unwrap();

        let t1: Vec<_> = store
            .stop_times_for_trip("T1")
            .iter()
            .map(|st| st.stop_sequence)
            .collect();
        assert_eq!(t1, vec![1, 2]);

        assert_eq!(store.stop_times_at_stop("1").len(), 2);
        assert_eq!(store.trips_for_route("A").len(), 2);
        assert!(store.trips_for_route("Z").is_empty());
    }

    #[test]
    fn test_rows_have_one_value_per_declared_column() {
        let tables = sample_tables();
        for table in Table::ALL {
            for row in tables.rows(table) {
                assert_eq!(row.len(), table.columns().len());
            }
        }
    }
}
