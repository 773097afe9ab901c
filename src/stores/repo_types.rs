use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Store listing in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    pub slug: String, // unique, derived from name
    pub description: String,
    pub tags: Vec<String>,
    pub photo: Option<String>, // object key in photo storage
    pub address: String,
    pub lng: Option<f64>,
    pub lat: Option<f64>,
    pub author: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

impl Store {
    pub fn location(&self) -> Option<Location> {
        Some(Location {
            lng: self.lng?,
            lat: self.lat?,
        })
    }
}

/// WGS84 point, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lng: f64,
    pub lat: f64,
}

impl Location {
    /// `None` unless both values are finite and on the globe.
    pub fn new(lng: f64, lat: f64) -> Option<Self> {
        let on_globe = lng.is_finite()
            && lat.is_finite()
            && (-180.0..=180.0).contains(&lng)
            && (-90.0..=90.0).contains(&lat);
        on_globe.then_some(Self { lng, lat })
    }
}

#[derive(Debug, Clone)]
pub struct NewStore {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub tags: Vec<String>,
    pub photo: Option<String>,
    pub address: String,
    pub location: Option<Location>,
    pub author: Uuid,
}

/// A store and its distance in metres from the queried point.
#[derive(Debug, Clone, FromRow)]
pub struct NearbyStore {
    #[sqlx(flatten)]
    pub store: Store,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct SearchHit {
    pub name: String,
    pub slug: String,
}
