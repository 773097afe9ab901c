use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{EditStorePage, NearQuery, NearbyView, SearchQuery, StorePage, StoresPage, TagsPage},
    repo_types::{Location, NewStore, SearchHit},
    services::{read_store_form, store_view, store_views, unique_slug, upload_photo, StoreForm},
};
use crate::{
    auth::require_login,
    error::AppError,
    state::AppState,
    web::{CurrentUser, FlashRedirect, Notice, Notices, Page},
};

const SEARCH_LIMIT: i64 = 5;
const NEAR_LIMIT: i64 = 10;
const NEAR_RADIUS_M: f64 = 10_000.0;
const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_stores))
        .route("/stores", get(list_stores))
        .route("/store/:slug", get(show_store))
        .route("/tags", get(stores_by_tag))
        .route("/tags/:tag", get(stores_by_tag))
        .route("/api/search", get(search_stores))
        .route("/api/stores/near", get(stores_near))
}

pub fn write_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/add", get(add_store).post(create_store))
        .route("/add/:id", post(update_store))
        .route("/stores/:id/edit", get(edit_store))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
}

/// Notice + redirect back for a form that cannot be saved, if any.
fn form_problem(form: &StoreForm, headers: &HeaderMap, fallback: &str) -> Option<FlashRedirect> {
    if form.name.is_empty() {
        return Some(
            FlashRedirect::back(headers, fallback)
                .with_notice(Notice::error("You must supply a store name!")),
        );
    }
    if form.photo.as_ref().is_some_and(|p| !p.is_image()) {
        return Some(
            FlashRedirect::back(headers, fallback)
                .with_notice(Notice::error("That filetype isn't allowed!")),
        );
    }
    if let Err(message) = form.location() {
        return Some(FlashRedirect::back(headers, fallback).with_notice(Notice::error(message)));
    }
    None
}

#[instrument(skip_all)]
pub async fn list_stores(
    State(state): State<AppState>,
    notices: Notices,
) -> Result<Page<StoresPage>, AppError> {
    let stores = state.stores.list().await?;
    let stores = store_views(state.storage.as_ref(), stores).await;
    Ok(Page::new("Stores", notices, StoresPage { stores }))
}

pub async fn add_store(notices: Notices) -> Page<EditStorePage> {
    Page::new("Add Store", notices, EditStorePage { store: None })
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn create_store(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    mut mp: Multipart,
) -> Result<FlashRedirect, AppError> {
    let mut form = read_store_form(&mut mp).await?;
    if let Some(redirect) = form_problem(&form, &headers, "/add") {
        return Ok(redirect);
    }

    let photo = match form.photo.take() {
        Some(p) => Some(upload_photo(state.storage.as_ref(), p).await?),
        None => None,
    };
    let location = form.location().map_err(|m| AppError::BadRequest(m.into()))?;
    let slug = unique_slug(state.stores.as_ref(), &form.name, None).await?;
    let store = state
        .stores
        .insert(NewStore {
            name: form.name,
            slug,
            description: form.description,
            tags: form.tags,
            photo,
            address: form.address,
            location,
            author: user.id,
        })
        .await?;

    info!(store_id = %store.id, slug = %store.slug, "store created");
    Ok(FlashRedirect::to(format!("/store/{}", store.slug))
        .with_notice(Notice::success(format!("Successfully created {}.", store.name))))
}

#[instrument(skip_all, fields(user_id = %user.id, store_id = %id))]
pub async fn edit_store(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    notices: Notices,
) -> Result<Response, AppError> {
    let store = state.stores.find_by_id(id).await?.ok_or(AppError::NotFound)?;
    if store.author != Some(user.id) {
        warn!("edit refused: not the owner");
        return Ok(FlashRedirect::to("/stores")
            .with_notice(Notice::error("You must own a store in order to edit it!"))
            .into_response());
    }

    let title = format!("Edit {}", store.name);
    let store = store_view(state.storage.as_ref(), store).await;
    Ok(Page::new(title, notices, EditStorePage { store: Some(store) }).into_response())
}

#[instrument(skip_all, fields(user_id = %user.id, store_id = %id))]
pub async fn update_store(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    mut mp: Multipart,
) -> Result<FlashRedirect, AppError> {
    let mut store = state.stores.find_by_id(id).await?.ok_or(AppError::NotFound)?;
    if store.author != Some(user.id) {
        warn!("update refused: not the owner");
        return Ok(FlashRedirect::to("/stores")
            .with_notice(Notice::error("You must own a store in order to edit it!")));
    }

    let edit_path = format!("/stores/{id}/edit");
    let mut form = read_store_form(&mut mp).await?;
    if let Some(redirect) = form_problem(&form, &headers, &edit_path) {
        return Ok(redirect);
    }

    let location = form.location().map_err(|m| AppError::BadRequest(m.into()))?;
    let replaced_photo = match form.photo.take() {
        Some(p) => {
            let key = upload_photo(state.storage.as_ref(), p).await?;
            store.photo.replace(key)
        }
        None => None,
    };
    if form.name != store.name {
        store.slug = unique_slug(state.stores.as_ref(), &form.name, Some(store.id)).await?;
    }
    store.name = form.name;
    store.description = form.description;
    store.tags = form.tags;
    store.address = form.address;
    store.lng = location.map(|l| l.lng);
    store.lat = location.map(|l| l.lat);
    let store = state.stores.update(&store).await?;

    if let Some(old) = replaced_photo {
        if let Err(e) = state.storage.delete_object(&old).await {
            warn!(error = %e, key = %old, "old photo not deleted");
        }
    }

    info!(slug = %store.slug, "store updated");
    Ok(FlashRedirect::to(edit_path)
        .with_notice(Notice::success(format!("Successfully updated {}.", store.name))))
}

#[instrument(skip(state, notices))]
pub async fn show_store(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    notices: Notices,
) -> Result<Page<StorePage>, AppError> {
    let store = state.stores.find_by_slug(&slug).await?.ok_or(AppError::NotFound)?;
    let title = store.name.clone();
    let store = store_view(state.storage.as_ref(), store).await;
    Ok(Page::new(title, notices, StorePage { store }))
}

#[instrument(skip(state, notices))]
pub async fn stores_by_tag(
    State(state): State<AppState>,
    tag: Option<Path<String>>,
    notices: Notices,
) -> Result<Page<TagsPage>, AppError> {
    let tag = tag.map(|Path(t)| t);
    let tags = state.stores.tag_counts().await?;
    let stores = state.stores.list_by_tag(tag.as_deref()).await?;
    let stores = store_views(state.storage.as_ref(), stores).await;
    Ok(Page::new("Tags", notices, TagsPage { tags, tag, stores }))
}

#[instrument(skip(state))]
pub async fn search_stores(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(Json(Vec::new()));
    }
    Ok(Json(state.stores.search(q, SEARCH_LIMIT).await?))
}

#[instrument(skip(state))]
pub async fn stores_near(
    State(state): State<AppState>,
    Query(query): Query<NearQuery>,
) -> Result<Json<Vec<NearbyView>>, AppError> {
    let at = Location::new(query.lng, query.lat)
        .ok_or_else(|| AppError::BadRequest("lat/lng out of range".into()))?;
    let found = state.stores.near(at, NEAR_RADIUS_M, NEAR_LIMIT).await?;

    let mut out = Vec::with_capacity(found.len());
    for hit in found {
        out.push(NearbyView {
            store: store_view(state.storage.as_ref(), hit.store).await,
            distance: hit.distance,
        });
    }
    Ok(Json(out))
}
