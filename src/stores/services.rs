use std::time::Duration;

use anyhow::Context;
use axum::extract::Multipart;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use super::{
    dto::StoreView,
    repo::StoreRepo,
    repo_types::{Location, Store},
};
use crate::{error::AppError, storage::PhotoStorage};

const PHOTO_URL_TTL: Duration = Duration::from_secs(30 * 60);

pub struct UploadedPhoto {
    pub body: Bytes,
    pub content_type: String,
}

impl UploadedPhoto {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// Fields of the add/edit store form.
#[derive(Default)]
pub struct StoreForm {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub photo: Option<UploadedPhoto>,
    pub address: String,
    pub lng: String,
    pub lat: String,
}

pub const BAD_LOCATION: &str = "That location is not valid!";

impl StoreForm {
    /// Both coordinates or neither; given ones must parse and lie on the globe.
    pub fn location(&self) -> Result<Option<Location>, &'static str> {
        match (self.lng.as_str(), self.lat.as_str()) {
            ("", "") => Ok(None),
            (lng, lat) => {
                let lng = lng.parse::<f64>().map_err(|_| BAD_LOCATION)?;
                let lat = lat.parse::<f64>().map_err(|_| BAD_LOCATION)?;
                Location::new(lng, lat).map(Some).ok_or(BAD_LOCATION)
            }
        }
    }
}

fn bad_form<E: std::fmt::Display>(e: E) -> AppError {
    AppError::BadRequest(format!("invalid form: {e}"))
}

/// Read the multipart store form. An empty file input means "no new photo".
pub async fn read_store_form(mp: &mut Multipart) -> Result<StoreForm, AppError> {
    let mut form = StoreForm::default();
    while let Some(field) = mp.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "name" => form.name = field.text().await.map_err(bad_form)?.trim().to_string(),
            "description" => {
                form.description = field.text().await.map_err(bad_form)?.trim().to_string()
            }
            "tags" | "tags[]" => form.tags.push(field.text().await.map_err(bad_form)?),
            "address" | "location[address]" => {
                form.address = field.text().await.map_err(bad_form)?.trim().to_string()
            }
            "lng" | "location[coordinates][0]" => {
                form.lng = field.text().await.map_err(bad_form)?.trim().to_string()
            }
            "lat" | "location[coordinates][1]" => {
                form.lat = field.text().await.map_err(bad_form)?.trim().to_string()
            }
            "photo" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field.bytes().await.map_err(bad_form)?;
                if !body.is_empty() {
                    form.photo = Some(UploadedPhoto { body, content_type });
                }
            }
            _ => {}
        }
    }
    form.tags = normalize_tags(form.tags);
    Ok(form)
}

/// Trimmed, non-empty, first occurrence wins.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

pub fn make_slug(name: &str) -> String {
    let s = slug::slugify(name);
    if s.is_empty() {
        "store".to_string()
    } else {
        s
    }
}

/// Slug for `name`, suffixed one past the highest `-n` already in use.
pub async fn unique_slug(
    repo: &dyn StoreRepo,
    name: &str,
    exclude: Option<Uuid>,
) -> anyhow::Result<String> {
    let base = make_slug(name);
    match repo.max_slug_suffix(&base, exclude).await? {
        None => Ok(base),
        Some(n) => Ok(format!("{}-{}", base, n + 1)),
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

pub fn photo_key(content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("stores/{}.{}", Uuid::new_v4(), ext)
}

pub async fn upload_photo(storage: &dyn PhotoStorage, photo: UploadedPhoto) -> anyhow::Result<String> {
    let key = photo_key(&photo.content_type);
    storage
        .put_object(&key, photo.body, &photo.content_type)
        .await
        .with_context(|| format!("upload photo {key}"))?;
    Ok(key)
}

/// A missing photo URL degrades the page rather than failing it.
pub async fn store_view(storage: &dyn PhotoStorage, store: Store) -> StoreView {
    let photo_url = match &store.photo {
        Some(key) => match storage.presign_get(key, PHOTO_URL_TTL).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, key = %key, "presign photo failed");
                None
            }
        },
        None => None,
    };
    StoreView::new(store, photo_url)
}

pub async fn store_views(storage: &dyn PhotoStorage, stores: Vec<Store>) -> Vec<StoreView> {
    let mut out = Vec::with_capacity(stores.len());
    for s in stores {
        out.push(store_view(storage, s).await);
    }
    out
}
