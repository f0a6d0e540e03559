use super::{NewsStore, RecordFilter};
use crate::types::{NewsRecord, RecordPatch, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

const COLUMNS: &str = "id, title, summary, content, category, severity, source, url, published_at, \
     tags, is_breaking, is_published, view_count, image_url, read_time_minutes, created_at, updated_at";

/// Postgres-backed store. `url` carries the unique constraint used for dedup.
#[derive(Clone)]
pub struct PgNewsStore {
    db: PgPool,
}

impl PgNewsStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let db = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self { db };
        store.setup_schema().await?;
        Ok(store)
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &PgPool {
        &self.db
    }

    pub async fn setup_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news_records (
                id TEXT NOT NULL,
                title TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL,
                severity TEXT NOT NULL,
                source TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                published_at TIMESTAMPTZ NOT NULL,
                tags TEXT[] NOT NULL DEFAULT '{}',
                is_breaking BOOLEAN NOT NULL DEFAULT FALSE,
                is_published BOOLEAN NOT NULL DEFAULT TRUE,
                view_count BIGINT NOT NULL DEFAULT 0,
                image_url TEXT NOT NULL DEFAULT '',
                read_time_minutes INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_news_records_id ON news_records(id)")
            .execute(&self.db)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_news_records_created ON news_records(created_at DESC)")
            .execute(&self.db)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_news_records_listing ON news_records(is_published, category)",
        )
        .execute(&self.db)
        .await?;

        info!("news_records schema ready");
        Ok(())
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &RecordFilter) {
        builder.push(" WHERE TRUE");
        if let Some(id) = &filter.id {
            builder.push(" AND id = ").push_bind(id.clone());
        }
        if let Some(url) = &filter.url {
            builder.push(" AND url = ").push_bind(url.clone());
        }
        if let Some(published) = filter.published {
            builder.push(" AND is_published = ").push_bind(published);
        }
        if let Some(category) = filter.category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(breaking) = filter.breaking {
            builder.push(" AND is_breaking = ").push_bind(breaking);
        }
    }

    async fn insert_with(&self, record: &NewsRecord, on_conflict: &str) -> Result<u64, sqlx::Error> {
        let sql = format!(
            "INSERT INTO news_records ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) {}",
            COLUMNS, on_conflict
        );

        let result = sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.title)
            .bind(&record.summary)
            .bind(&record.content)
            .bind(record.category.as_str())
            .bind(record.severity.as_str())
            .bind(&record.source)
            .bind(&record.url)
            .bind(record.published_at)
            .bind(&record.tags)
            .bind(record.is_breaking)
            .bind(record.is_published)
            .bind(record.view_count as i64)
            .bind(&record.image_url)
            .bind(record.read_time_minutes as i32)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

fn record_from_row(row: &PgRow) -> StoreResult<NewsRecord> {
    let category: String = row.try_get("category")?;
    let severity: String = row.try_get("severity")?;

    Ok(NewsRecord {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        content: row.try_get("content")?,
        category: category
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
        severity: severity
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("{}", e)))?,
        source: row.try_get("source")?,
        url: row.try_get("url")?,
        published_at: row.try_get::<DateTime<Utc>, _>("published_at")?,
        tags: row.try_get("tags")?,
        is_breaking: row.try_get("is_breaking")?,
        is_published: row.try_get("is_published")?,
        view_count: row.try_get::<i64, _>("view_count")?.max(0) as u64,
        image_url: row.try_get("image_url")?,
        read_time_minutes: row.try_get::<i32, _>("read_time_minutes")?.max(1) as u32,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl NewsStore for PgNewsStore {
    async fn find(&self, filter: &RecordFilter, limit: usize, offset: usize) -> StoreResult<Vec<NewsRecord>> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM news_records", COLUMNS));
        Self::push_filter(&mut builder, filter);
        builder
            .push(" ORDER BY created_at DESC, published_at DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset as i64);

        let rows = builder.build().fetch_all(&self.db).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn find_one(&self, filter: &RecordFilter) -> StoreResult<Option<NewsRecord>> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM news_records", COLUMNS));
        Self::push_filter(&mut builder, filter);
        builder.push(" LIMIT 1");

        let row = builder.build().fetch_optional(&self.db).await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert(&self, record: &NewsRecord) -> StoreResult<String> {
        match self.insert_with(record, "").await {
            Ok(_) => Ok(record.id.clone()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::Conflict {
                url: record.url.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_if_absent(&self, record: &NewsRecord) -> StoreResult<bool> {
        let inserted = self.insert_with(record, "ON CONFLICT (url) DO NOTHING").await? > 0;
        if !inserted {
            debug!("Skipping existing url: {}", record.url);
        }
        Ok(inserted)
    }

    async fn count(&self, filter: &RecordFilter) -> StoreResult<u64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM news_records");
        Self::push_filter(&mut builder, filter);

        let row = builder.build().fetch_one(&self.db).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn update(&self, id: &str, patch: &RecordPatch) -> StoreResult<Option<NewsRecord>> {
        let sql = format!(
            r#"
            UPDATE news_records SET
                title = COALESCE($1, title),
                summary = COALESCE($2, summary),
                content = COALESCE($3, content),
                category = COALESCE($4, category),
                severity = COALESCE($5, severity),
                tags = COALESCE($6, tags),
                is_breaking = COALESCE($7, is_breaking),
                is_published = COALESCE($8, is_published),
                image_url = COALESCE($9, image_url),
                updated_at = $10
            WHERE id = $11
            RETURNING {}
            "#,
            COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(&patch.title)
            .bind(&patch.summary)
            .bind(&patch.content)
            .bind(patch.category.map(|c| c.as_str()))
            .bind(patch.severity.map(|s| s.as_str()))
            .bind(&patch.tags)
            .bind(patch.is_breaking)
            .bind(patch.is_published)
            .bind(&patch.image_url)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM news_records WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_views(&self, id: &str) -> StoreResult<u64> {
        let row = sqlx::query(
            "UPDATE news_records SET view_count = view_count + 1, updated_at = NOW() WHERE id = $1 RETURNING view_count",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(row.try_get::<i64, _>("view_count")?.max(0) as u64),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }
}
