//! State store boundary. The core touches three things: it appends to the
//! action log on behalf of the submission API, attaches `result` to a row
//! once, and upserts the single `browser_state` row after every browser
//! action. Prompt and answer rows belong to UI-level collaborators; the
//! schema is created here so they have somewhere to live.

use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::action::{ActionStep, PageState, PersistedAction};
use crate::error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data TEXT NOT NULL,
    result TEXT
);
CREATE TABLE IF NOT EXISTS browser_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    url TEXT NOT NULL,
    html TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS prompt (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    text TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS answers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    workflow_id TEXT NOT NULL
);
"#;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn append_action(&self, data: &ActionStep) -> Result<PersistedAction, StoreError>;
    /// The ordered action log.
    async fn actions(&self) -> Result<Vec<PersistedAction>, StoreError>;
    async fn record_result(&self, id: i64, result: &str) -> Result<(), StoreError>;
    async fn upsert_browser_state(&self, url: &str, html: &str) -> Result<(), StoreError>;
    async fn browser_state(&self) -> Result<Option<PageState>, StoreError>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // One connection: the engine manages one logical session per process,
        // and this also keeps in-memory databases coherent.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn append_action(&self, data: &ActionStep) -> Result<PersistedAction, StoreError> {
        let encoded = serde_json::to_string(data).map_err(|err| StoreError::Corrupt {
            id: 0,
            reason: err.to_string(),
        })?;
        let result = sqlx::query("INSERT INTO actions (data) VALUES (?1)")
            .bind(&encoded)
            .execute(&self.pool)
            .await?;
        Ok(PersistedAction {
            id: result.last_insert_rowid(),
            data: data.clone(),
            result: None,
        })
    }

    async fn actions(&self) -> Result<Vec<PersistedAction>, StoreError> {
        let rows = sqlx::query("SELECT id, data, result FROM actions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                let encoded: String = row.try_get("data")?;
                let data = serde_json::from_str(&encoded).map_err(|err| StoreError::Corrupt {
                    id,
                    reason: err.to_string(),
                })?;
                Ok(PersistedAction {
                    id,
                    data,
                    result: row.try_get("result")?,
                })
            })
            .collect()
    }

    async fn record_result(&self, id: i64, result: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE actions SET result = ?1 WHERE id = ?2")
            .bind(result)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_browser_state(&self, url: &str, html: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO browser_state (id, url, html) VALUES (1, ?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET url = excluded.url, html = excluded.html",
        )
        .bind(url)
        .bind(html)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn browser_state(&self) -> Result<Option<PageState>, StoreError> {
        let row = sqlx::query("SELECT url, html FROM browser_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(PageState {
                url: row.try_get("url")?,
                html: row.try_get("html")?,
            }),
            None => None,
        })
    }
}

/// In-memory store with the same contract, for tests and dry wiring.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    actions: Vec<PersistedAction>,
    state: Option<PageState>,
    next_id: i64,
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn append_action(&self, data: &ActionStep) -> Result<PersistedAction, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let action = PersistedAction {
            id: inner.next_id,
            data: data.clone(),
            result: None,
        };
        inner.actions.push(action.clone());
        Ok(action)
    }

    async fn actions(&self) -> Result<Vec<PersistedAction>, StoreError> {
        Ok(self.inner.lock().unwrap().actions.clone())
    }

    async fn record_result(&self, id: i64, result: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(action) = inner.actions.iter_mut().find(|action| action.id == id) {
            action.result = Some(result.to_owned());
        }
        Ok(())
    }

    async fn upsert_browser_state(&self, url: &str, html: &str) -> Result<(), StoreError> {
        self.inner.lock().unwrap().state = Some(PageState {
            url: url.to_owned(),
            html: html.to_owned(),
        });
        Ok(())
    }

    async fn browser_state(&self) -> Result<Option<PageState>, StoreError> {
        Ok(self.inner.lock().unwrap().state.clone())
    }
}
