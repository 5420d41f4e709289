//! SQLite form of the relational store.
//!
//! One SQL table per entity table, columns in declared order, no uniqueness
//! constraints so duplicate keys survive. The declared indices are created
//! after the bulk insert.

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::{Null, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OpenFlags, Transaction, params_from_iter};
use tracing::{debug, info};

use crate::error::PackagingError;
use crate::index::IndexSpec;
use crate::schema::{Column, ColumnType, DATE_FORMAT, Record, Table, Value};
use crate::store::{RelationalStore, Tables};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::from(Null),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Date(d) => ToSqlOutput::from(d.format(DATE_FORMAT).to_string()),
        })
    }
}

fn sql_type(kind: ColumnType) -> &'static str {
    match kind {
        ColumnType::Text | ColumnType::Date => "TEXT",
        ColumnType::Integer => "INTEGER",
        ColumnType::Float => "REAL",
    }
}

fn column_list(table: Table) -> String {
    table
        .columns()
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn create_table_sql(table: Table) -> String {
    let columns: Vec<String> = table
        .columns()
        .iter()
        .map(|c| {
            let constraint = if c.nullable { "" } else { " NOT NULL" };
            format!("{} {}{}", c.name, sql_type(c.kind), constraint)
        })
        .collect();
    format!("CREATE TABLE {} ({})", table.name(), columns.join(", "))
}

fn create_index_sql(spec: &IndexSpec) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {}({})",
        spec.name,
        spec.table.name(),
        spec.column
    )
}

/// Writes `store` into a new database at `path`, then compacts and checks it.
pub fn write_store(path: &Path, store: &RelationalStore) -> Result<(), PackagingError> {
    let mut conn = Connection::open(path)?;

    let tx = conn.transaction()?;
    for table in Table::ALL {
        tx.execute(&create_table_sql(table), [])?;
        insert_rows(&tx, table, store.tables().rows(table))?;
    }
    tx.commit()?;

    for index in store.indices() {
        conn.execute(&create_index_sql(index.spec()), [])?;
    }

    conn.execute_batch("VACUUM; ANALYZE;")?;
    integrity_check(&conn)?;

    info!(path = %path.display(), "Database written");
    Ok(())
}

fn insert_rows(
    tx: &Transaction<'_>,
    table: Table,
    rows: Vec<Vec<Value>>,
) -> Result<(), PackagingError> {
    let placeholders: Vec<String> = (1..=table.columns().len())
        .map(|i| format!("?{i}"))
        .collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name(),
        column_list(table),
        placeholders.join(", ")
    );

    let mut stmt = tx.prepare(&sql)?;
    for row in &rows {
        stmt.execute(params_from_iter(row.iter()))?;
    }
    debug!(table = table.name(), rows = rows.len(), "Rows inserted");
    Ok(())
}

fn integrity_check(conn: &Connection) -> Result<(), PackagingError> {
    let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if result == "ok" {
        Ok(())
    } else {
        Err(PackagingError::Integrity(result))
    }
}

/// Reloads the entity tables from a database written by [`write_store`].
pub fn read_tables(path: &Path) -> Result<Tables, PackagingError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    Ok(Tables {
        agency: read_records(&conn)?,
        routes: read_records(&conn)?,
        trips: read_records(&conn)?,
        stops: read_records(&conn)?,
        stop_times: read_records(&conn)?,
        calendar: read_records(&conn)?,
        calendar_dates: read_records(&conn)?,
        shapes: read_records(&conn)?,
    })
}

fn read_records<R: Record>(conn: &Connection) -> Result<Vec<R>, PackagingError> {
    let table = R::TABLE;
    let columns = table.columns();
    let sql = format!(
        "SELECT {} FROM {} ORDER BY rowid",
        column_list(table),
        table.name()
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mismatch = PackagingError::SchemaMismatch {
            table,
            row: records.len(),
        };
        let mut values = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            match read_value(row.get_ref(i)?, column) {
                Some(value) => values.push(value),
                None => return Err(mismatch),
            }
        }
        match R::from_values(values) {
            Some(record) => records.push(record),
            None => return Err(mismatch),
        }
    }
    Ok(records)
}

fn read_value(value: ValueRef<'_>, column: &Column) -> Option<Value> {
    match (value, column.kind) {
        (ValueRef::Null, _) => Some(Value::Null),
        (ValueRef::Text(bytes), ColumnType::Text) => {
            Some(Value::Text(std::str::from_utf8(bytes).ok()?.to_string()))
        }
        (ValueRef::Text(bytes), ColumnType::Date) => {
            let text = std::str::from_utf8(bytes).ok()?;
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .map(Value::Date)
        }
        (ValueRef::Integer(i), ColumnType::Integer) => Some(Value::Integer(i)),
        (ValueRef::Integer(i), ColumnType::Float) => Some(Value::Float(i as f64)),
        (ValueRef::Real(f), ColumnType::Float) => Some(Value::Float(f)),
        _ => None,
    }
}

/// Names of the explicitly created indices, sorted.
pub fn list_indices(path: &Path) -> Result<Vec<String>, PackagingError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND sql IS NOT NULL ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql_follows_schema() {
        assert_eq!(
            create_table_sql(Table::CalendarDates),
            "CREATE TABLE calendar_dates (service_id TEXT NOT NULL, date TEXT, exception_type INTEGER NOT NULL)"
        );
        assert!(create_table_sql(Table::Shapes).contains("shape_pt_lat REAL NOT NULL"));
        assert!(create_table_sql(Table::Shapes).contains("shape_dist_traveled REAL,"));
    }

    #[test]
    fn test_values_bind_by_type() {
        use rusqlite::types::Value as SqlValue;

        let date = Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        match date.to_sql().unwrap() {
            ToSqlOutput::Owned(SqlValue::Text(s)) => assert_eq!(s, "20240229"),
            other => panic!("unexpected binding: {other:?}"),
        }
        assert!(matches!(
            Value::Null.to_sql().unwrap(),
            ToSqlOutput::Owned(SqlValue::Null)
        ));
    }

    #[test]
    fn test_read_value_rejects_foreign_types() {
        let column = Column::integer("stop_sequence");
        assert_eq!(read_value(ValueRef::Integer(4), &column), Some(Value::Integer(4)));
        assert_eq!(read_value(ValueRef::Text(b"4"), &column), None);
        assert_eq!(read_value(ValueRef::Real(4.0), &column), None);
    }
}
