use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::{fmt, str::FromStr, sync::RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to acquire repository lock")]
    LockPoisoned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPredictionRecord {
    /// Path of the stored upload, relative to the media directory.
    pub image: String,
    pub created_on: NaiveDate,
    pub predicted_class: i64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub id: i64,
    pub image: String,
    pub created_on: NaiveDate,
    pub predicted_class: i64,
    pub confidence: f64,
}

impl PredictionRecord {
    fn from_new(id: i64, record: NewPredictionRecord) -> Self {
        Self {
            id,
            image: record.image,
            created_on: record.created_on,
            predicted_class: record.predicted_class,
            confidence: record.confidence,
        }
    }
}

impl fmt::Display for PredictionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prediction for {} on {}", self.image, self.created_on)
    }
}

/// Append-only store of prediction outcomes.
#[async_trait]
pub trait PredictionRepository: Send + Sync {
    async fn insert(&self, record: NewPredictionRecord) -> Result<PredictionRecord, PersistenceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPredictionRepository {
    records: RwLock<Vec<PredictionRecord>>,
}

impl InMemoryPredictionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Result<Vec<PredictionRecord>, PersistenceError> {
        let records = self
            .records
            .read()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(records.clone())
    }
}

#[async_trait]
impl PredictionRepository for InMemoryPredictionRepository {
    async fn insert(&self, record: NewPredictionRecord) -> Result<PredictionRecord, PersistenceError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| PersistenceError::LockPoisoned)?;

        let record = PredictionRecord::from_new(records.len() as i64 + 1, record);
        records.push(record.clone());
        Ok(record)
    }
}

pub struct SqlitePredictionRepository {
    pool: SqlitePool,
}

impl SqlitePredictionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database and makes sure the table exists.
    pub async fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let repository = Self::new(pool);
        repository.ensure_table().await?;
        tracing::info!("Connected to prediction database");

        Ok(repository)
    }

    pub async fn ensure_table(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                image TEXT NOT NULL,
                created_on TEXT NOT NULL,
                predicted_class INTEGER NOT NULL,
                confidence REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PredictionRepository for SqlitePredictionRepository {
    async fn insert(&self, record: NewPredictionRecord) -> Result<PredictionRecord, PersistenceError> {
        let row = sqlx::query(
            r#"
            INSERT INTO predictions (image, created_on, predicted_class, confidence)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&record.image)
        .bind(record.created_on)
        .bind(record.predicted_class)
        .bind(record.confidence)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        Ok(PredictionRecord::from_new(id, record))
    }
}
