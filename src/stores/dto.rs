use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Location, Store, TagCount};

/// Store as shown to clients; the photo key is swapped for a presigned URL.
#[derive(Debug, Serialize)]
pub struct StoreView {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub tags: Vec<String>,
    pub photo_url: Option<String>,
    pub address: String,
    pub location: Option<Location>,
    pub author: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

impl StoreView {
    pub fn new(store: Store, photo_url: Option<String>) -> Self {
        Self {
            location: store.location(),
            address: store.address,
            id: store.id,
            name: store.name,
            slug: store.slug,
            description: store.description,
            tags: store.tags,
            photo_url,
            author: store.author,
            created_at: store.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StoresPage {
    pub stores: Vec<StoreView>,
}

#[derive(Debug, Serialize)]
pub struct StorePage {
    pub store: StoreView,
}

/// Add and edit share one form; `store` is empty when adding.
#[derive(Debug, Serialize)]
pub struct EditStorePage {
    pub store: Option<StoreView>,
}

#[derive(Debug, Serialize)]
pub struct TagsPage {
    pub tags: Vec<TagCount>,
    pub tag: Option<String>,
    pub stores: Vec<StoreView>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// `GET /api/stores/near?lat=..&lng=..`
#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Serialize)]
pub struct NearbyView {
    #[serde(flatten)]
    pub store: StoreView,
    /// Metres from the queried point.
    pub distance: f64,
}
