use std::fmt::Display;
use std::fmt::Formatter;
use std::ops::RangeInclusive;

use framework::exception::CoreRsResult;
use framework::validation_error;
use serde::Deserialize;
use serde::Serialize;

pub const LATITUDE_RANGE: RangeInclusive<f64> = -90.0..=90.0;
pub const LONGITUDE_RANGE: RangeInclusive<f64> = -180.0..=180.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn is_valid(&self) -> bool {
        LATITUDE_RANGE.contains(&self.latitude) && LONGITUDE_RANGE.contains(&self.longitude)
    }
}

// value format of the truck location topic
impl Display for Coordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "lat:{},lon:{}", self.latitude, self.longitude)
    }
}

/// One GPS fix of a vehicle, as published to the location topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(rename = "vehicleId")]
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// epoch millis
    #[serde(rename = "timeStamp")]
    pub timestamp: i64,
}

impl LocationRecord {
    pub fn new(vehicle_id: impl Into<String>, coordinate: Coordinate, timestamp: i64) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            timestamp,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    pub fn validate(&self) -> CoreRsResult<()> {
        if self.vehicle_id.is_empty() {
            return Err(validation_error!(message = "vehicleId must not be empty"));
        }
        // NaN fails contains() as well
        if !LATITUDE_RANGE.contains(&self.latitude) {
            return Err(validation_error!(
                message = format!("latitude out of range, vehicleId={}, latitude={}", self.vehicle_id, self.latitude)
            ));
        }
        if !LONGITUDE_RANGE.contains(&self.longitude) {
            return Err(validation_error!(
                message = format!(
                    "longitude out of range, vehicleId={}, longitude={}",
                    self.vehicle_id, self.longitude
                )
            ));
        }
        Ok(())
    }
}
