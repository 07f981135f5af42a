//! Great-circle distance helpers for responder travel estimates.

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_MILES: f64 = 3963.19;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Location from optional coordinates. Missing or zero coordinates mean "not geocoded".
    pub fn from_coords(lat: Option<f64>, lng: Option<f64>) -> Option<Self> {
        match (lat, lng) {
            (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 => Some(Self { lat, lng }),
            _ => None,
        }
    }

    /// Haversine distance in statute miles.
    pub fn distance_miles(&self, other: &LatLng) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_MILES * a.sqrt().atan2((1.0 - a).sqrt())
    }
}
