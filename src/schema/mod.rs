//! The fixed relational schema of a snapshot.
//!
//! Every entity table has one record type whose fields mirror the declared
//! columns in order. Values cross module boundaries as [`Value`] so the
//! fingerprinter and the SQLite writer can walk any table uniformly.

mod cell;
mod records;

use std::fmt;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;

pub use cell::{Cell, deserialize_cell};
pub use records::{Agency, Calendar, CalendarDate, Route, Shape, Stop, StopTime, Trip};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Date,
}

/// One declared column of an entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnType,
    pub nullable: bool,
}

impl Column {
    const fn new(name: &'static str, kind: ColumnType, nullable: bool) -> Self {
        Self {
            name,
            kind,
            nullable,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, ColumnType::Text, false)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnType::Integer, false)
    }

    pub const fn float(name: &'static str) -> Self {
        Self::new(name, ColumnType::Float, false)
    }

    pub const fn nullable_float(name: &'static str) -> Self {
        Self::new(name, ColumnType::Float, true)
    }

    pub const fn date(name: &'static str) -> Self {
        Self::new(name, ColumnType::Date, true)
    }
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
}

impl Value {
    /// Whether this value is admissible for `column`.
    pub fn conforms_to(&self, column: &Column) -> bool {
        match (self, column.kind) {
            (Value::Null, _) => column.nullable,
            (Value::Text(_), ColumnType::Text) => true,
            (Value::Integer(_), ColumnType::Integer) => true,
            (Value::Float(_), ColumnType::Float) => true,
            (Value::Date(_), ColumnType::Date) => true,
            _ => false,
        }
    }

    /// Text form used as an index key. Dates render as `YYYYMMDD`.
    pub fn key_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
        }
    }
}

/// Date format used by feed files and by the database artifact.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// The eight entity tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Agency,
    Routes,
    Trips,
    Stops,
    StopTimes,
    Calendar,
    CalendarDates,
    Shapes,
}

impl Table {
    /// Declared table order. Fingerprinting and packaging visit tables in
    /// this order, never in archive order.
    pub const ALL: [Table; 8] = [
        Table::Agency,
        Table::Routes,
        Table::Trips,
        Table::Stops,
        Table::StopTimes,
        Table::Calendar,
        Table::CalendarDates,
        Table::Shapes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Agency => "agency",
            Table::Routes => "routes",
            Table::Trips => "trips",
            Table::Stops => "stops",
            Table::StopTimes => "stop_times",
            Table::Calendar => "calendar",
            Table::CalendarDates => "calendar_dates",
            Table::Shapes => "shapes",
        }
    }

    /// Name of the feed file this table is read from.
    pub fn file_name(self) -> &'static str {
        match self {
            Table::Agency => "agency.txt",
            Table::Routes => "routes.txt",
            Table::Trips => "trips.txt",
            Table::Stops => "stops.txt",
            Table::StopTimes => "stop_times.txt",
            Table::Calendar => "calendar.txt",
            Table::CalendarDates => "calendar_dates.txt",
            Table::Shapes => "shapes.txt",
        }
    }

    /// Whether a feed without this file is malformed.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Table::Routes | Table::Trips | Table::Stops | Table::StopTimes
        )
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Table::Agency => AGENCY_COLUMNS,
            Table::Routes => ROUTE_COLUMNS,
            Table::Trips => TRIP_COLUMNS,
            Table::Stops => STOP_COLUMNS,
            Table::StopTimes => STOP_TIME_COLUMNS,
            Table::Calendar => CALENDAR_COLUMNS,
            Table::CalendarDates => CALENDAR_DATE_COLUMNS,
            Table::Shapes => SHAPE_COLUMNS,
        }
    }

    pub fn primary_key(self) -> &'static [&'static str] {
        match self {
            Table::Agency => &["agency_id"],
            Table::Routes => &["route_id"],
            Table::Trips => &["trip_id"],
            Table::Stops => &["stop_id"],
            Table::StopTimes => &["trip_id", "stop_sequence"],
            Table::Calendar => &["service_id"],
            Table::CalendarDates => &["service_id", "date"],
            Table::Shapes => &["shape_id", "shape_pt_sequence"],
        }
    }

    /// Position of `column` in the declared column order.
    pub fn column_position(self, column: &str) -> Option<usize> {
        self.columns().iter().position(|c| c.name == column)
    }

    /// Positions of the primary-key columns.
    pub fn key_positions(self) -> Vec<usize> {
        self.primary_key()
            .iter()
            .filter_map(|name| self.column_position(name))
            .collect()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fixed-shape row of one entity table.
pub trait Record: DeserializeOwned + Default + Clone + fmt::Debug {
    const TABLE: Table;

    /// Values in declared column order. Always one per declared column.
    fn values(&self) -> Vec<Value>;

    /// Rebuilds a row from values in declared column order.
    fn from_values(values: Vec<Value>) -> Option<Self>;
}

const AGENCY_COLUMNS: &[Column] = &[
    Column::text("agency_id"),
    Column::text("agency_name"),
    Column::text("agency_url"),
    Column::text("agency_timezone"),
    Column::text("agency_lang"),
    Column::text("agency_phone"),
];

const ROUTE_COLUMNS: &[Column] = &[
    Column::text("route_id"),
    Column::text("agency_id"),
    Column::text("route_short_name"),
    Column::text("route_long_name"),
    Column::integer("route_type"),
    Column::text("route_color"),
    Column::text("route_text_color"),
];

const TRIP_COLUMNS: &[Column] = &[
    Column::text("trip_id"),
    Column::text("route_id"),
    Column::text("service_id"),
    Column::text("trip_headsign"),
    Column::text("trip_short_name"),
    Column::text("direction_id"),
    Column::text("block_id"),
    Column::text("shape_id"),
    Column::text("wheelchair_accessible"),
    Column::text("bikes_allowed"),
];

const STOP_COLUMNS: &[Column] = &[
    Column::text("stop_id"),
    Column::text("stop_code"),
    Column::text("stop_name"),
    Column::text("stop_desc"),
    Column::float("stop_lat"),
    Column::float("stop_lon"),
    Column::text("zone_id"),
    Column::text("stop_url"),
    Column::text("location_type"),
    Column::text("parent_station"),
    Column::text("stop_timezone"),
    Column::text("wheelchair_boarding"),
];

const STOP_TIME_COLUMNS: &[Column] = &[
    Column::text("trip_id"),
    Column::text("arrival_time"),
    Column::text("departure_time"),
    Column::text("stop_id"),
    Column::integer("stop_sequence"),
    Column::text("stop_headsign"),
    Column::text("pickup_type"),
    Column::text("drop_off_type"),
    Column::nullable_float("shape_dist_traveled"),
    Column::text("timepoint"),
];

const CALENDAR_COLUMNS: &[Column] = &[
    Column::text("service_id"),
    Column::integer("monday"),
    Column::integer("tuesday"),
    Column::integer("wednesday"),
    Column::integer("thursday"),
    Column::integer("friday"),
    Column::integer("saturday"),
    Column::integer("sunday"),
    Column::date("start_date"),
    Column::date("end_date"),
];

const CALENDAR_DATE_COLUMNS: &[Column] = &[
    Column::text("service_id"),
    Column::date("date"),
    Column::integer("exception_type"),
];

const SHAPE_COLUMNS: &[Column] = &[
    Column::text("shape_id"),
    Column::float("shape_pt_lat"),
    Column::float("shape_pt_lon"),
    Column::integer("shape_pt_sequence"),
    Column::nullable_float("shape_dist_traveled"),
];
