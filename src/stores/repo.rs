use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Location, NearbyStore, NewStore, SearchHit, Store, TagCount};

const STORE_COLUMNS: &str =
    "id, name, slug, description, tags, photo, address, lng, lat, author, created_at";

/// Matches `base` and `base-<n>`; longer digit runs are not suffixes we hand out.
fn slug_variant_pattern(base: &str) -> String {
    format!("^{}(-[0-9]{{1,9}})?$", regex::escape(base))
}

#[async_trait]
pub trait StoreRepo: Send + Sync {
    /// Newest first.
    async fn list(&self) -> anyhow::Result<Vec<Store>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Store>>;
    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Store>>;
    /// Highest suffix among slugs `base` (counted as 1) and `base-<n>`,
    /// ignoring `exclude`. `None` when no store uses `base` at all.
    async fn max_slug_suffix(&self, base: &str, exclude: Option<Uuid>) -> anyhow::Result<Option<i64>>;
    async fn insert(&self, store: NewStore) -> anyhow::Result<Store>;
    async fn update(&self, store: &Store) -> anyhow::Result<Store>;
    /// Every tag with the number of stores carrying it, most used first.
    async fn tag_counts(&self) -> anyhow::Result<Vec<TagCount>>;
    /// Stores carrying `tag`, or every tagged store when `tag` is `None`.
    async fn list_by_tag(&self, tag: Option<&str>) -> anyhow::Result<Vec<Store>>;
    /// Full-text match on name and description, best match first.
    async fn search(&self, query: &str, limit: i64) -> anyhow::Result<Vec<SearchHit>>;
    /// Located stores within `radius_m` metres of `at`, nearest first.
    async fn near(&self, at: Location, radius_m: f64, limit: i64) -> anyhow::Result<Vec<NearbyStore>>;
}

#[derive(Clone)]
pub struct PgStoreRepo {
    db: PgPool,
}

impl PgStoreRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StoreRepo for PgStoreRepo {
    async fn list(&self) -> anyhow::Result<Vec<Store>> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM stores ORDER BY created_at DESC");
        sqlx::query_as::<_, Store>(&sql)
            .fetch_all(&self.db)
            .await
            .context("list stores")
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Store>> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = $1");
        sqlx::query_as::<_, Store>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find store by id")
    }

    async fn find_by_slug(&self, slug: &str) -> anyhow::Result<Option<Store>> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM stores WHERE slug = $1");
        sqlx::query_as::<_, Store>(&sql)
            .bind(slug)
            .fetch_optional(&self.db)
            .await
            .context("find store by slug")
    }

    async fn max_slug_suffix(&self, base: &str, exclude: Option<Uuid>) -> anyhow::Result<Option<i64>> {
        let (max,): (Option<i64>,) = sqlx::query_as(
            r#"
            SELECT MAX(CASE WHEN slug = $1 THEN 1
                            ELSE substring(slug FROM '-([0-9]+)$')::bigint END)
              FROM stores
             WHERE slug ~ $2
               AND ($3::uuid IS NULL OR id <> $3)
            "#,
        )
        .bind(base)
        .bind(slug_variant_pattern(base))
        .bind(exclude)
        .fetch_one(&self.db)
        .await
        .context("find slug suffix")?;
        Ok(max)
    }

    async fn insert(&self, store: NewStore) -> anyhow::Result<Store> {
        let sql = format!(
            "INSERT INTO stores (name, slug, description, tags, photo, address, lng, lat, author) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {STORE_COLUMNS}"
        );
        sqlx::query_as::<_, Store>(&sql)
            .bind(&store.name)
            .bind(&store.slug)
            .bind(&store.description)
            .bind(&store.tags)
            .bind(&store.photo)
            .bind(&store.address)
            .bind(store.location.map(|l| l.lng))
            .bind(store.location.map(|l| l.lat))
            .bind(store.author)
            .fetch_one(&self.db)
            .await
            .context("insert store")
    }

    async fn update(&self, store: &Store) -> anyhow::Result<Store> {
        let sql = format!(
            "UPDATE stores SET name = $2, slug = $3, description = $4, tags = $5, photo = $6, \
                    address = $7, lng = $8, lat = $9 \
             WHERE id = $1 RETURNING {STORE_COLUMNS}"
        );
        sqlx::query_as::<_, Store>(&sql)
            .bind(store.id)
            .bind(&store.name)
            .bind(&store.slug)
            .bind(&store.description)
            .bind(&store.tags)
            .bind(&store.photo)
            .bind(&store.address)
            .bind(store.lng)
            .bind(store.lat)
            .fetch_one(&self.db)
            .await
            .with_context(|| format!("update store {}", store.id))
    }

    async fn tag_counts(&self) -> anyhow::Result<Vec<TagCount>> {
        sqlx::query_as::<_, TagCount>(
            r#"
            SELECT tag, COUNT(*) AS count
              FROM stores, unnest(tags) AS tag
             GROUP BY tag
             ORDER BY count DESC, tag ASC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("count tags")
    }

    async fn list_by_tag(&self, tag: Option<&str>) -> anyhow::Result<Vec<Store>> {
        let sql = format!(
            "SELECT {STORE_COLUMNS} FROM stores \
             WHERE CASE WHEN $1::text IS NULL THEN cardinality(tags) > 0 \
                        ELSE $1 = ANY(tags) END \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, Store>(&sql)
            .bind(tag)
            .fetch_all(&self.db)
            .await
            .context("list stores by tag")
    }

    async fn search(&self, query: &str, limit: i64) -> anyhow::Result<Vec<SearchHit>> {
        sqlx::query_as::<_, SearchHit>(
            r#"
            SELECT name, slug
              FROM stores
             WHERE to_tsvector('english', name || ' ' || description)
                   @@ plainto_tsquery('english', $1)
             ORDER BY ts_rank(to_tsvector('english', name || ' ' || description),
                              plainto_tsquery('english', $1)) DESC,
                      name ASC
             LIMIT $2
            "#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("search stores")
    }

    async fn near(&self, at: Location, radius_m: f64, limit: i64) -> anyhow::Result<Vec<NearbyStore>> {
        // Haversine on a 6371 km sphere.
        let sql = format!(
            "SELECT * FROM ( \
                 SELECT {STORE_COLUMNS}, \
                        12742000.0 * asin(sqrt( \
                            power(sin(radians(lat - $2) / 2), 2) + \
                            cos(radians($2)) * cos(radians(lat)) * \
                            power(sin(radians(lng - $1) / 2), 2))) AS distance \
                   FROM stores \
                  WHERE lng IS NOT NULL AND lat IS NOT NULL \
             ) located \
             WHERE distance <= $3 \
             ORDER BY distance ASC \
             LIMIT $4"
        );
        sqlx::query_as::<_, NearbyStore>(&sql)
            .bind(at.lng)
            .bind(at.lat)
            .bind(radius_m)
            .bind(limit)
            .fetch_all(&self.db)
            .await
            .context("stores near point")
    }
}
