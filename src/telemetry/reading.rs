use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, sqlx::FromRow)]
pub struct SensorReading {
    pub co2_ppm: u16,

    pub tvoc_ppm: u16,

    pub bmp280_temperature: f32,

    pub bmp280_pressure: f32,

    pub mlx_object_temperature: f32,

    pub mlx_ambient_temperature: f32,

    pub humidity_dht: f32,

    pub temperature_dht: f32,

    /// Seconds the PIR sensor reported activity during the last poll.
    pub pir_uptime: f32,
}

/// A reading as persisted, with its row id and server-assigned timestamp (UTC).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredReading {
    pub id: i64,

    #[sqlx(flatten)]
    pub reading: SensorReading,

    pub timestamp: NaiveDateTime,
}
