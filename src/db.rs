use std::{path::Path, time::Duration};

use anyhow::{Context as _, Result};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use thiserror::Error;

use crate::telemetry::{SensorReading, StoredReading};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
#[error("failed to store sensor reading: {0}")]
pub struct StoreError(#[from] sqlx::Error);

/// Opens (creating if needed) the database file at `path` and ensures the schema.
pub async fn new_pool(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    open_pool(options)
        .await
        .with_context(|| format!("failed to open database: {}", path.display()))
}

/// Opens a pool holding exactly one connection, so every statement is
/// serialized through it.
pub async fn open_pool(options: SqliteConnectOptions) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options.busy_timeout(BUSY_TIMEOUT))
        .await
        .context("failed to connect to database")?;

    ensure_schema(&pool)
        .await
        .context("failed to create database schema")?;

    Ok(pool)
}

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            co2_ppm FLOAT,
            tvoc_ppm FLOAT,
            bmp280_temperature FLOAT,
            bmp280_pressure FLOAT,
            mlx_object_temperature FLOAT,
            mlx_ambient_temperature FLOAT,
            humidity_dht FLOAT,
            temperature_dht FLOAT,
            pir_uptime FLOAT,
            timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to execute create table query")?;

    Ok(())
}

/// Appends one reading in its own transaction and returns the new row id.
pub async fn insert_reading(pool: &SqlitePool, reading: &SensorReading) -> Result<i64, StoreError> {
    let mut tx = pool.begin().await?;

    let id = sqlx::query(
        r#"
        INSERT INTO sensor_data (co2_ppm, tvoc_ppm, bmp280_temperature, bmp280_pressure, mlx_object_temperature, mlx_ambient_temperature, humidity_dht, temperature_dht, pir_uptime)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(reading.co2_ppm)
    .bind(reading.tvoc_ppm)
    .bind(reading.bmp280_temperature)
    .bind(reading.bmp280_pressure)
    .bind(reading.mlx_object_temperature)
    .bind(reading.mlx_ambient_temperature)
    .bind(reading.humidity_dht)
    .bind(reading.temperature_dht)
    .bind(reading.pir_uptime)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    tx.commit().await?;

    Ok(id)
}

pub async fn list_readings(pool: &SqlitePool) -> Result<Vec<StoredReading>> {
    // co2/tvoc live in FLOAT columns for compatibility with existing files
    let readings = sqlx::query_as::<_, StoredReading>(
        r#"
        SELECT
            id,
            CAST(co2_ppm AS INTEGER) AS co2_ppm,
            CAST(tvoc_ppm AS INTEGER) AS tvoc_ppm,
            bmp280_temperature,
            bmp280_pressure,
            mlx_object_temperature,
            mlx_ambient_temperature,
            humidity_dht,
            temperature_dht,
            pir_uptime,
            timestamp
        FROM sensor_data
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to execute select readings query")?;

    Ok(readings)
}

pub async fn count_readings(pool: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sensor_data")
        .fetch_one(pool)
        .await
        .context("failed to execute count readings query")
}
