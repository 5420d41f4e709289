//! Secondary indices over the entity tables.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::IndexBuildError;
use crate::schema::Table;
use crate::store::Tables;

/// One declared (table, key column) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub table: Table,
    pub column: &'static str,
}

/// Indices every snapshot carries, in build order.
pub const INDEX_SPECS: &[IndexSpec] = &[
    IndexSpec {
        name: "idx_stop_times_trip_id",
        table: Table::StopTimes,
        column: "trip_id",
    },
    IndexSpec {
        name: "idx_stop_times_stop_id",
        table: Table::StopTimes,
        column: "stop_id",
    },
    IndexSpec {
        name: "idx_trips_route_id",
        table: Table::Trips,
        column: "route_id",
    },
    IndexSpec {
        name: "idx_trips_service_id",
        table: Table::Trips,
        column: "service_id",
    },
    IndexSpec {
        name: "idx_shapes_id",
        table: Table::Shapes,
        column: "shape_id",
    },
    IndexSpec {
        name: "idx_calendar_dates_service",
        table: Table::CalendarDates,
        column: "service_id",
    },
    IndexSpec {
        name: "idx_calendar_dates_date",
        table: Table::CalendarDates,
        column: "date",
    },
];

/// Key value to row positions, positions ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    spec: IndexSpec,
    entries: BTreeMap<String, Vec<usize>>,
}

impl Index {
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    /// Positions of the rows whose key column renders as `key`.
    pub fn lookup(&self, key: &str) -> &[usize] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn distinct_keys(&self) -> usize {
        self.entries.len()
    }
}

/// Builds one index per spec. Fails only when a spec names a column its
/// table does not declare.
pub fn build_indices(tables: &Tables, specs: &[IndexSpec]) -> Result<Vec<Index>, IndexBuildError> {
    let mut positions = Vec::with_capacity(specs.len());
    for spec in specs {
        let position =
            spec.table
                .column_position(spec.column)
                .ok_or(IndexBuildError::UnknownColumn {
                    index: spec.name,
                    table: spec.table,
                    column: spec.column,
                })?;
        positions.push(position);
    }

    let mut indices: Vec<Index> = specs
        .iter()
        .map(|spec| Index {
            spec: *spec,
            entries: BTreeMap::new(),
        })
        .collect();

    // Materialize each table once, however many indices it has.
    for table in Table::ALL {
        if !specs.iter().any(|s| s.table == table) {
            continue;
        }
        let rows = tables.rows(table);
        for (index, &column) in indices.iter_mut().zip(&positions) {
            if index.spec.table != table {
                continue;
            }
            for (pos, row) in rows.iter().enumerate() {
                index
                    .entries
                    .entry(row[column].key_text())
                    .or_default()
                    .push(pos);
            }
            debug!(
                index = index.spec.name,
                keys = index.entries.len(),
                "Index built"
            );
        }
    }

    Ok(indices)
}
