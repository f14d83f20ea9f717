use garde::Validate;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{entities::cinema, error::AppResult};

/// Spatial reference of every stored point: WGS 84 longitude/latitude degrees.
pub const SRID_WGS84: i32 = 4326;

/// Mean Earth radius (IUGG), in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;
const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

pub const DEFAULT_RADIUS_KM: u32 = 10;
pub const MAX_RADIUS_KM: u32 = 50;

/// A point with `x` = longitude and `y` = latitude.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
    pub srid: i32,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { x: longitude, y: latitude, srid: SRID_WGS84 }
    }

    pub fn longitude(&self) -> f64 {
        self.x
    }

    pub fn latitude(&self) -> f64 {
        self.y
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.y.to_radians(), other.y.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.x - self.x).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }
}

/// Search radius in kilometers, never above [`MAX_RADIUS_KM`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "u32")]
pub struct RadiusKm(u32);

impl RadiusKm {
    pub fn new(km: u32) -> Self {
        Self(km.min(MAX_RADIUS_KM))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn meters(self) -> f64 {
        f64::from(self.0) * 1000.0
    }
}

impl Default for RadiusKm {
    fn default() -> Self {
        Self(DEFAULT_RADIUS_KM)
    }
}

impl From<u32> for RadiusKm {
    fn from(km: u32) -> Self {
        Self::new(km)
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQuery {
    #[garde(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[garde(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[serde(default)]
    #[garde(skip)]
    pub radius_km: RadiusKm,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyCinema {
    pub id: i32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_in_meters: f64,
}

/// Degree window that contains every point within `radius_m` of `center`.
/// The longitude window is dropped when the circle reaches a pole or crosses the antimeridian.
#[derive(Clone, Copy, Debug, PartialEq)]
struct BoundingBox {
    lat: (f64, f64),
    lon: Option<(f64, f64)>,
}

impl BoundingBox {
    fn around(center: &GeoPoint, radius_m: f64) -> Self {
        // Widened slightly so points sitting exactly on the radius survive the prefilter.
        let d_lat = radius_m / METERS_PER_DEGREE_LAT * 1.01 + 1e-6;
        let lat = (center.y - d_lat, center.y + d_lat);

        let crosses_pole = lat.0 < -90.0 || lat.1 > 90.0;
        let cos_lat = center.y.to_radians().cos();
        let lon = if !crosses_pole && cos_lat > 1e-6 {
            let d_lon = d_lat / cos_lat;
            let (min, max) = (center.x - d_lon, center.x + d_lon);
            (min >= -180.0 && max <= 180.0).then_some((min, max))
        } else {
            None
        };

        Self { lat, lon }
    }
}

/// Cinemas within `query.radius_km` of the query point, nearest first.
pub async fn cinemas_near(db: &DatabaseConnection, query: &NearbyQuery) -> AppResult<Vec<NearbyCinema>> {
    let origin = GeoPoint::new(query.longitude, query.latitude);
    let max_distance = query.radius_km.meters();
    let bbox = BoundingBox::around(&origin, max_distance);

    let mut select = cinema::Entity::find()
        .filter(cinema::Column::Latitude.between(bbox.lat.0, bbox.lat.1));
    if let Some((min, max)) = bbox.lon {
        select = select.filter(cinema::Column::Longitude.between(min, max));
    }
    let candidates = select.all(db).await?;

    debug!(candidates = candidates.len(), radius_km = query.radius_km.get(), "proximity prefilter");

    let mut found: Vec<(f64, cinema::Model)> = candidates
        .into_iter()
        .filter_map(|c| {
            let distance = c.location().distance_to(&origin);
            (distance <= max_distance).then_some((distance, c))
        })
        .collect();
    found.sort_by(|a, b| a.0.total_cmp(&b.0));

    Ok(found
        .into_iter()
        .map(|(distance, c)| NearbyCinema {
            id: c.id,
            name: c.name,
            latitude: c.latitude,
            longitude: c.longitude,
            distance_in_meters: distance.round(),
        })
        .collect())
}
