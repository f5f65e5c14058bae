//! SQLite persistence for config records

use crate::model::{ConfigPatch, ConfigRecord, NewConfig};
use crate::observability::metrics::StoreMetrics;
use crate::query::{ListQuery, SortField};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

const TABLE: &str = "api_configs";

const COLUMNS: &str = "id, name, url, method, parameters, request_body, headers, \
                       response_rule, created_at, updated_at";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS api_configs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        url TEXT NOT NULL,
        method TEXT NOT NULL,
        parameters TEXT NOT NULL DEFAULT '',
        request_body TEXT NOT NULL DEFAULT '',
        headers TEXT NOT NULL DEFAULT '',
        response_rule TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_api_configs_method ON api_configs (method)",
    "CREATE INDEX IF NOT EXISTS idx_api_configs_created_at ON api_configs (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_api_configs_updated_at ON api_configs (updated_at)",
];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("pool error: {0}")]
    Pool(#[source] sqlx::Error),
    #[error("query error: {0}")]
    Query(#[source] sqlx::Error),
    #[error("config {0} not found")]
    NotFound(i64),
    #[error("config name `{0}` already exists")]
    DuplicateName(String),
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: String,
    pub max_size: u32,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_size: 1,
        }
    }
}

/// Page of records plus the unpaged match count
#[derive(Debug, Clone)]
pub struct ListPage {
    pub items: Vec<ConfigRecord>,
    pub total: i64,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    pool: SqlitePool,
}

impl ConfigStore {
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        let pool = if config.url == "sqlite::memory:" {
            // Every connection to :memory: is a separate database; pin to one and never recycle it
            let opts = SqliteConnectOptions::from_str(&config.url).map_err(StoreError::Pool)?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(opts)
                .await
                .map_err(StoreError::Pool)?
        } else {
            let filename = config.url.strip_prefix("sqlite:").unwrap_or(&config.url);
            let opts = SqliteConnectOptions::new()
                .filename(filename)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));
            SqlitePoolOptions::new()
                .max_connections(config.max_size.max(1))
                .connect_with(opts)
                .await
                .map_err(StoreError::Pool)?
        };

        tracing::info!(
            url = %config.url,
            max_pool_size = config.max_size,
            "Connected to SQLite"
        );
        Ok(Self { pool })
    }

    /// Idempotent table + index creation
    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        for stmt in SCHEMA {
            sqlx::raw_sql(stmt)
                .execute(&self.pool)
                .await
                .map_err(StoreError::Query)?;
        }
        tracing::info!(table = TABLE, "Schema initialized");
        Ok(())
    }

    pub async fn create(&self, new: &NewConfig) -> Result<ConfigRecord, StoreError> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO {TABLE} (name, url, method, parameters, request_body, headers, \
             response_rule, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {COLUMNS}"
        );
        let res = observe(
            "insert",
            sqlx::query_as::<_, ConfigRecord>(&sql)
                .bind(&new.name)
                .bind(&new.url)
                .bind(&new.method)
                .bind(&new.parameters)
                .bind(&new.request_body)
                .bind(&new.headers)
                .bind(&new.response_rule)
                .bind(now)
                .bind(now)
                .fetch_one(&self.pool),
        )
        .await;

        res.map_err(|e| classify(e, &new.name))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<ConfigRecord, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = ?");
        observe(
            "select",
            sqlx::query_as::<_, ConfigRecord>(&sql)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(StoreError::Query)?
        .ok_or(StoreError::NotFound(id))
    }

    /// Overwrite only the fields present in `patch`; always refreshes `updated_at`
    pub async fn update_partial(&self, patch: &ConfigPatch) -> Result<ConfigRecord, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE ");
        qb.push(TABLE).push(" SET ");
        {
            let mut sep = qb.separated(", ");
            for (col, value) in patch.assignments() {
                sep.push(col).push_unseparated(" = ").push_bind_unseparated(value);
            }
            sep.push("updated_at = ").push_bind_unseparated(Utc::now());
        }
        qb.push(" WHERE id = ").push_bind(patch.id);
        qb.push(" RETURNING ").push(COLUMNS);

        let res = observe(
            "update",
            qb.build_query_as::<ConfigRecord>()
                .fetch_optional(&self.pool),
        )
        .await;

        match res {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(StoreError::NotFound(patch.id)),
            Err(e) => Err(classify(e, patch.name.as_deref().unwrap_or_default())),
        }
    }

    /// Hard delete; zero rows affected is NotFound
    pub async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {TABLE} WHERE id = ?");
        let res = observe(
            "delete",
            sqlx::query(&sql).bind(id).execute(&self.pool),
        )
        .await
        .map_err(StoreError::Query)?;

        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub async fn list(&self, query: &ListQuery) -> Result<ListPage, StoreError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
        count.push(TABLE);
        push_filters(&mut count, query);
        let total: i64 = observe(
            "count",
            count.build_query_scalar::<i64>().fetch_one(&self.pool),
        )
        .await
        .map_err(StoreError::Query)?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(COLUMNS).push(" FROM ").push(TABLE);
        push_filters(&mut qb, query);
        let order = query.sort_order.sql();
        qb.push(" ORDER BY ")
            .push(query.sort_field.column())
            .push(" ")
            .push(order);
        if query.sort_field != SortField::Id {
            // deterministic paging when the sort key ties
            qb.push(", id ").push(order);
        }
        qb.push(" LIMIT ").push_bind(query.limit());
        qb.push(" OFFSET ").push_bind(query.offset());

        let items = observe(
            "select",
            qb.build_query_as::<ConfigRecord>().fetch_all(&self.pool),
        )
        .await
        .map_err(StoreError::Query)?;

        Ok(ListPage { items, total })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &ListQuery) {
    let mut glue = " WHERE ";
    if let Some(keyword) = &query.keyword {
        qb.push(glue)
            .push("(instr(LOWER(name), ")
            .push_bind(keyword.clone())
            .push(") > 0 OR instr(LOWER(url), ")
            .push_bind(keyword.clone())
            .push(") > 0)");
        glue = " AND ";
    }
    if let Some(method) = &query.method {
        qb.push(glue).push("UPPER(method) = ").push_bind(method.clone());
    }
}

fn classify(err: sqlx::Error, name: &str) -> StoreError {
    let unique = err
        .as_database_error()
        .is_some_and(|d| d.is_unique_violation());
    if unique {
        StoreError::DuplicateName(name.to_string())
    } else {
        StoreError::Query(err)
    }
}

async fn observe<T>(
    operation: &'static str,
    fut: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, sqlx::Error> {
    let metrics = StoreMetrics::start(operation);
    let res = fut.await;
    metrics.finish(res.is_ok());
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ListParams, QueryBuilder as ListQueryBuilder};
    use std::collections::HashMap;

    async fn store() -> ConfigStore {
        let store = ConfigStore::connect(StoreConfig::in_memory()).await.unwrap();
        store.initialize_schema().await.unwrap();
        store
    }

    fn new_config(name: &str, url: &str, method: &str) -> NewConfig {
        NewConfig {
            name: name.to_string(),
            url: url.to_string(),
            method: method.to_string(),
            parameters: r#"{"a":1}"#.to_string(),
            request_body: r#"{"b":"x"}"#.to_string(),
            headers: r#"{"X-Token":"t"}"#.to_string(),
            response_rule: "data.url".to_string(),
        }
    }

    fn plan(pairs: &[(&str, &str)]) -> ListQuery {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ListQueryBuilder::build(&ListParams::from_query(&map)).unwrap()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store().await;
        let input = new_config("img-host", "https://x/upload", "POST");
        let created = store.create(&input).await.unwrap();
        assert!(created.id > 0);

        let fetched = store.get_by_id(created.id).await.unwrap();
        assert_eq!(fetched.name, input.name);
        assert_eq!(fetched.url, input.url);
        assert_eq!(fetched.method, input.method);
        assert_eq!(fetched.parameters, input.parameters);
        assert_eq!(fetched.request_body, input.request_body);
        assert_eq!(fetched.headers, input.headers);
        assert_eq!(fetched.response_rule, input.response_rule);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected_and_store_unchanged() {
        let store = store().await;
        store.create(&new_config("dup", "https://a", "POST")).await.unwrap();
        let err = store
            .create(&new_config("dup", "https://b", "GET"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(ref n) if n == "dup"));

        let page = store.list(&ListQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].url, "https://a");
    }

    #[tokio::test]
    async fn partial_update_keeps_unsupplied_fields() {
        let store = store().await;
        let created = store.create(&new_config("p", "https://a", "POST")).await.unwrap();
        let patch = ConfigPatch {
            id: created.id,
            url: Some("https://b".to_string()),
            headers: Some(String::new()),
            ..Default::default()
        };
        let updated = store.update_partial(&patch).await.unwrap();
        assert_eq!(updated.url, "https://b");
        assert_eq!(updated.headers, "");
        assert_eq!(updated.name, "p");
        assert_eq!(updated.method, "POST");
        assert_eq!(updated.parameters, created.parameters);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn update_missing_or_conflicting() {
        let store = store().await;
        let missing = ConfigPatch {
            id: 99,
            name: Some("x".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_partial(&missing).await,
            Err(StoreError::NotFound(99))
        ));

        store.create(&new_config("a", "https://a", "POST")).await.unwrap();
        let b = store.create(&new_config("b", "https://b", "POST")).await.unwrap();
        let rename = ConfigPatch {
            id: b.id,
            name: Some("a".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_partial(&rename).await,
            Err(StoreError::DuplicateName(_))
        ));
        assert_eq!(store.get_by_id(b.id).await.unwrap().name, "b");
    }

    #[tokio::test]
    async fn delete_is_permanent_and_ids_are_not_reused() {
        let store = store().await;
        let first = store.create(&new_config("a", "https://a", "POST")).await.unwrap();
        store.delete_by_id(first.id).await.unwrap();
        assert!(matches!(
            store.get_by_id(first.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_by_id(first.id).await,
            Err(StoreError::NotFound(_))
        ));

        let second = store.create(&new_config("a", "https://a", "POST")).await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn keyword_and_method_filters() {
        let store = store().await;
        store
            .create(&new_config("img-host", "https://x/upload", "POST"))
            .await
            .unwrap();
        store
            .create(&new_config("files", "https://CDN.IMG.example/put", "post"))
            .await
            .unwrap();
        store
            .create(&new_config("other", "https://y", "GET"))
            .await
            .unwrap();
        // only parameters/headers contain "img" here; must not match
        let mut hidden = new_config("plain", "https://z", "PUT");
        hidden.parameters = "img".to_string();
        hidden.response_rule = "IMG".to_string();
        store.create(&hidden).await.unwrap();

        let page = store.list(&plan(&[("keyword", "IMG")])).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(page.total, 2);
        assert!(names.contains(&"img-host"));
        assert!(names.contains(&"files"));

        let page = store.list(&plan(&[("method", "get")])).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "other");

        let page = store.list(&plan(&[("method", "POST")])).await.unwrap();
        assert_eq!(page.total, 2);

        let page = store
            .list(&plan(&[("keyword", "img"), ("method", "GET")]))
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn keyword_wildcards_are_literal() {
        let store = store().await;
        store.create(&new_config("a_b", "https://a", "POST")).await.unwrap();
        store.create(&new_config("axb", "https://b", "POST")).await.unwrap();
        let page = store.list(&plan(&[("keyword", "_")])).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "a_b");
        let page = store.list(&plan(&[("keyword", "%")])).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn whitespace_keyword_matches_literally() {
        let store = store().await;
        store.create(&new_config("img-host", "https://x/upload", "POST")).await.unwrap();
        store.create(&new_config("my img host", "https://y/upload", "POST")).await.unwrap();

        let page = store.list(&plan(&[("keyword", " ")])).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "my img host");

        let page = store.list(&plan(&[("keyword", "   ")])).await.unwrap();
        assert_eq!(page.total, 0);

        let page = store.list(&plan(&[("keyword", "")])).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn paging_and_sorting() {
        let store = store().await;
        for name in ["c", "a", "e", "b", "d"] {
            store
                .create(&new_config(name, &format!("https://{name}"), "POST"))
                .await
                .unwrap();
        }

        let page = store
            .list(&plan(&[("sortField", "name"), ("sortOrder", "asc"), ("pageSize", "2")]))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        let names: Vec<_> = page.items.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);

        let page = store
            .list(&plan(&[
                ("sortField", "name"),
                ("sortOrder", "asc"),
                ("pageSize", "2"),
                ("page", "3"),
            ]))
            .await
            .unwrap();
        let names: Vec<_> = page.items.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["e"]);

        // default: id desc, so newest first
        let page = store.list(&ListQuery::default()).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["d", "b", "e", "a", "c"]);

        // unknown field falls back to id
        let page = store
            .list(&plan(&[("sortField", "url"), ("sortOrder", "asc")]))
            .await
            .unwrap();
        assert_eq!(page.items[0].name, "c");

        let past_end = store.list(&plan(&[("page", "9")])).await.unwrap();
        assert_eq!(past_end.total, 5);
        assert!(past_end.items.is_empty());
    }
}
