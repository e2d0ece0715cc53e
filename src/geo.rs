//! Geographic points and great-circle distance

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for haversine distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Build a point, rejecting coordinates outside the valid ranges
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if is_valid_coordinate(lat, lon) {
            Some(Self { lat, lon })
        } else {
            None
        }
    }

    /// Human-readable label used when a user shares a raw location
    pub fn label(&self) -> String {
        format!("{:.4}, {:.4}", self.lat, self.lon)
    }
}

pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Haversine distance in kilometres between two coordinates
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Clamp guards against rounding pushing `a` slightly above 1
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}
