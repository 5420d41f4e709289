//! Content fingerprint of a relational store.
//!
//! The digest covers row data only. Tables are visited in [`Table::ALL`]
//! order and rows are sorted by (primary key, full row) before hashing, so
//! file order inside the archive and row order inside a file never matter.
//!
//! Values are framed as a tag byte plus a fixed-width or length-prefixed
//! payload, so no in-data byte sequence can be mistaken for a boundary.
//! Changing any of this requires bumping [`CANONICAL_VERSION`].

use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::FingerprintError;
use crate::schema::{Table, Value};
use crate::store::{RelationalStore, Tables};

/// Version of the canonical serialization. Recorded in every manifest.
pub const CANONICAL_VERSION: u32 = 1;

/// Digest algorithm name recorded in every manifest.
pub const ALGORITHM: &str = "sha256";

const TAG_NULL: u8 = 0;
const TAG_TEXT: u8 = 1;
const TAG_INTEGER: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_DATE: u8 = 4;

/// Lowercase hex SHA-256 digest of a store's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(hex: String) -> Self {
        Self(hex)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprints a built store. Indices are derived and not hashed.
pub fn fingerprint(store: &RelationalStore) -> Result<Fingerprint, FingerprintError> {
    fingerprint_tables(store.tables())
}

pub fn fingerprint_tables(tables: &Tables) -> Result<Fingerprint, FingerprintError> {
    let mut hasher = Sha256::new();
    hasher.update(b"gtfs-snapshot");
    hasher.update(CANONICAL_VERSION.to_be_bytes());

    for table in Table::ALL {
        let rows = canonical_rows(table, tables.rows(table))?;

        write_text(&mut hasher, table.name());
        hasher.update((rows.len() as u64).to_be_bytes());
        for (_, encoded) in &rows {
            hasher.update(encoded);
        }
        debug!(table = table.name(), rows = rows.len(), "Table hashed");
    }

    Ok(Fingerprint(hex::encode(hasher.finalize())))
}

/// Encodes and sorts the rows of one table.
fn canonical_rows(
    table: Table,
    rows: Vec<Vec<Value>>,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, FingerprintError> {
    let columns = table.columns();
    let key_positions = table.key_positions();

    let mut encoded = Vec::with_capacity(rows.len());
    for (row_number, row) in rows.iter().enumerate() {
        for (value, column) in row.iter().zip(columns) {
            if !value.conforms_to(column) {
                return Err(FingerprintError::KindMismatch {
                    table,
                    column: column.name,
                    row: row_number,
                });
            }
            if let Value::Float(f) = value {
                if !f.is_finite() {
                    return Err(FingerprintError::NonFiniteFloat {
                        table,
                        column: column.name,
                        row: row_number,
                    });
                }
            }
        }
        if row.len() != columns.len() {
            return Err(FingerprintError::KindMismatch {
                table,
                column: columns.get(row.len()).map_or("<extra>", |c| c.name),
                row: row_number,
            });
        }

        let mut key = Vec::new();
        for &pos in &key_positions {
            encode_value(&mut key, &row[pos]);
        }
        let mut body = Vec::new();
        body.extend_from_slice(&(row.len() as u64).to_be_bytes());
        for value in row {
            encode_value(&mut body, value);
        }
        encoded.push((key, body));
    }

    encoded.sort_unstable();
    Ok(encoded)
}

fn write_text(hasher: &mut Sha256, text: &str) {
    hasher.update((text.len() as u64).to_be_bytes());
    hasher.update(text.as_bytes());
}

fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Text(s) => {
            out.push(TAG_TEXT);
            out.extend_from_slice(&(s.len() as u64).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Integer(i) => {
            out.push(TAG_INTEGER);
            out.extend_from_slice(&i.to_be_bytes());
        }
        Value::Float(f) => {
            // -0.0 and 0.0 are the same coordinate.
            let f = if *f == 0.0 { 0.0 } else { *f };
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Value::Date(d) => {
            out.push(TAG_DATE);
            out.extend_from_slice(&d.year().to_be_bytes());
            out.push(d.month() as u8);
            out.push(d.day() as u8);
        }
    }
}
