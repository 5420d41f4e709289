use chrono::NaiveDate;
use serde::Deserialize;

use super::{Cell, Record, Table, Value, deserialize_cell};

/// Pulls the next value off `values` as a `T`.
fn take<T: Cell>(values: &mut impl Iterator<Item = Value>) -> Option<T> {
    T::from_value(values.next()?)
}

/// Succeeds only when every value was consumed.
fn finish<R>(values: &mut impl Iterator<Item = Value>, record: R) -> Option<R> {
    values.next().is_none().then_some(record)
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Agency {
    pub agency_id: String,
    pub agency_name: String,
    pub agency_url: String,
    pub agency_timezone: String,
    pub agency_lang: String,
    pub agency_phone: String,
}

impl Record for Agency {
    const TABLE: Table = Table::Agency;

    fn values(&self) -> Vec<Value> {
        vec![
            self.agency_id.to_value(),
            self.agency_name.to_value(),
            self.agency_url.to_value(),
            self.agency_timezone.to_value(),
            self.agency_lang.to_value(),
            self.agency_phone.to_value(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut v = values.into_iter();
        let record = Self {
            agency_id: take(&mut v)?,
            agency_name: take(&mut v)?,
            agency_url: take(&mut v)?,
            agency_timezone: take(&mut v)?,
            agency_lang: take(&mut v)?,
            agency_phone: take(&mut v)?,
        };
        finish(&mut v, record)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Route {
    pub route_id: String,
    pub agency_id: String,
    pub route_short_name: String,
    pub route_long_name: String,
    #[serde(deserialize_with = "deserialize_cell")]
    pub route_type: i64,
    pub route_color: String,
    pub route_text_color: String,
}

impl Record for Route {
    const TABLE: Table = Table::Routes;

    fn values(&self) -> Vec<Value> {
        vec![
            self.route_id.to_value(),
            self.agency_id.to_value(),
            self.route_short_name.to_value(),
            self.route_long_name.to_value(),
            self.route_type.to_value(),
            self.route_color.to_value(),
            self.route_text_color.to_value(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut v = values.into_iter();
        let record = Self {
            route_id: take(&mut v)?,
            agency_id: take(&mut v)?,
            route_short_name: take(&mut v)?,
            route_long_name: take(&mut v)?,
            route_type: take(&mut v)?,
            route_color: take(&mut v)?,
            route_text_color: take(&mut v)?,
        };
        finish(&mut v, record)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Trip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub trip_headsign: String,
    pub trip_short_name: String,
    pub direction_id: String,
    pub block_id: String,
    pub shape_id: String,
    pub wheelchair_accessible: String,
    pub bikes_allowed: String,
}

impl Record for Trip {
    const TABLE: Table = Table::Trips;

    fn values(&self) -> Vec<Value> {
        vec![
            self.trip_id.to_value(),
            self.route_id.to_value(),
            self.service_id.to_value(),
            self.trip_headsign.to_value(),
            self.trip_short_name.to_value(),
            self.direction_id.to_value(),
            self.block_id.to_value(),
            self.shape_id.to_value(),
            self.wheelchair_accessible.to_value(),
            self.bikes_allowed.to_value(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut v = values.into_iter();
        let record = Self {
            trip_id: take(&mut v)?,
            route_id: take(&mut v)?,
            service_id: take(&mut v)?,
            trip_headsign: take(&mut v)?,
            trip_short_name: take(&mut v)?,
            direction_id: take(&mut v)?,
            block_id: take(&mut v)?,
            shape_id: take(&mut v)?,
            wheelchair_accessible: take(&mut v)?,
            bikes_allowed: take(&mut v)?,
        };
        finish(&mut v, record)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Stop {
    pub stop_id: String,
    pub stop_code: String,
    pub stop_name: String,
    pub stop_desc: String,
    #[serde(deserialize_with = "deserialize_cell")]
    pub stop_lat: f64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub stop_lon: f64,
    pub zone_id: String,
    pub stop_url: String,
    pub location_type: String,
    pub parent_station: String,
    pub stop_timezone: String,
    pub wheelchair_boarding: String,
}

impl Record for Stop {
    const TABLE: Table = Table::Stops;

    fn values(&self) -> Vec<Value> {
        vec![
            self.stop_id.to_value(),
            self.stop_code.to_value(),
            self.stop_name.to_value(),
            self.stop_desc.to_value(),
            self.stop_lat.to_value(),
            self.stop_lon.to_value(),
            self.zone_id.to_value(),
            self.stop_url.to_value(),
            self.location_type.to_value(),
            self.parent_station.to_value(),
            self.stop_timezone.to_value(),
            self.wheelchair_boarding.to_value(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut v = values.into_iter();
        let record = Self {
            stop_id: take(&mut v)?,
            stop_code: take(&mut v)?,
            stop_name: take(&mut v)?,
            stop_desc: take(&mut v)?,
            stop_lat: take(&mut v)?,
            stop_lon: take(&mut v)?,
            zone_id: take(&mut v)?,
            stop_url: take(&mut v)?,
            location_type: take(&mut v)?,
            parent_station: take(&mut v)?,
            stop_timezone: take(&mut v)?,
            wheelchair_boarding: take(&mut v)?,
        };
        finish(&mut v, record)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct StopTime {
    pub trip_id: String,
    pub arrival_time: String,
    pub departure_time: String,
    pub stop_id: String,
    #[serde(deserialize_with = "deserialize_cell")]
    pub stop_sequence: i64,
    pub stop_headsign: String,
    pub pickup_type: String,
    pub drop_off_type: String,
    #[serde(deserialize_with = "deserialize_cell")]
    pub shape_dist_traveled: Option<f64>,
    pub timepoint: String,
}

impl Record for StopTime {
    const TABLE: Table = Table::StopTimes;

    fn values(&self) -> Vec<Value> {
        vec![
            self.trip_id.to_value(),
            self.arrival_time.to_value(),
            self.departure_time.to_value(),
            self.stop_id.to_value(),
            self.stop_sequence.to_value(),
            self.stop_headsign.to_value(),
            self.pickup_type.to_value(),
            self.drop_off_type.to_value(),
            self.shape_dist_traveled.to_value(),
            self.timepoint.to_value(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut v = values.into_iter();
        let record = Self {
            trip_id: take(&mut v)?,
            arrival_time: take(&mut v)?,
            departure_time: take(&mut v)?,
            stop_id: take(&mut v)?,
            stop_sequence: take(&mut v)?,
            stop_headsign: take(&mut v)?,
            pickup_type: take(&mut v)?,
            drop_off_type: take(&mut v)?,
            shape_dist_traveled: take(&mut v)?,
            timepoint: take(&mut v)?,
        };
        finish(&mut v, record)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Calendar {
    pub service_id: String,
    #[serde(deserialize_with = "deserialize_cell")]
    pub monday: i64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub tuesday: i64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub wednesday: i64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub thursday: i64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub friday: i64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub saturday: i64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub sunday: i64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub start_date: Option<NaiveDate>,
    #[serde(deserialize_with = "deserialize_cell")]
    pub end_date: Option<NaiveDate>,
}

impl Record for Calendar {
    const TABLE: Table = Table::Calendar;

    fn values(&self) -> Vec<Value> {
        vec![
            self.service_id.to_value(),
            self.monday.to_value(),
            self.tuesday.to_value(),
            self.wednesday.to_value(),
            self.thursday.to_value(),
            self.friday.to_value(),
            self.saturday.to_value(),
            self.sunday.to_value(),
            self.start_date.to_value(),
            self.end_date.to_value(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut v = values.into_iter();
        let record = Self {
            service_id: take(&mut v)?,
            monday: take(&mut v)?,
            tuesday: take(&mut v)?,
            wednesday: take(&mut v)?,
            thursday: take(&mut v)?,
            friday: take(&mut v)?,
            saturday: take(&mut v)?,
            sunday: take(&mut v)?,
            start_date: take(&mut v)?,
            end_date: take(&mut v)?,
        };
        finish(&mut v, record)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct CalendarDate {
    pub service_id: String,
    #[serde(deserialize_with = "deserialize_cell")]
    pub date: Option<NaiveDate>,
    #[serde(deserialize_with = "deserialize_cell")]
    pub exception_type: i64,
}

impl Record for CalendarDate {
    const TABLE: Table = Table::CalendarDates;

    fn values(&self) -> Vec<Value> {
        vec![
            self.service_id.to_value(),
            self.date.to_value(),
            self.exception_type.to_value(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut v = values.into_iter();
        let record = Self {
            service_id: take(&mut v)?,
            date: take(&mut v)?,
            exception_type: take(&mut v)?,
        };
        finish(&mut v, record)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Shape {
    pub shape_id: String,
    #[serde(deserialize_with = "deserialize_cell")]
    pub shape_pt_lat: f64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub shape_pt_lon: f64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub shape_pt_sequence: i64,
    #[serde(deserialize_with = "deserialize_cell")]
    pub shape_dist_traveled: Option<f64>,
}

impl Record for Shape {
    const TABLE: Table = Table::Shapes;

    fn values(&self) -> Vec<Value> {
        vec![
            self.shape_id.to_value(),
            self.shape_pt_lat.to_value(),
            self.shape_pt_lon.to_value(),
            self.shape_pt_sequence.to_value(),
            self.shape_dist_traveled.to_value(),
        ]
    }

    fn from_values(values: Vec<Value>) -> Option<Self> {
        let mut v = values.into_iter();
        let record = Self {
            shape_id: take(&mut v)?,
            shape_pt_lat: take(&mut v)?,
            shape_pt_lon: take(&mut v)?,
            shape_pt_sequence: take(&mut v)?,
            shape_dist_traveled: take(&mut v)?,
        };
        finish(&mut v, record)
    }
}
