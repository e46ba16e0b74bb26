//! Fixed-layout little-endian payloads sent by the sensor node.
//!
//! Both layouts are read from offset 0. Bytes past the end of a layout are
//! ignored so that nodes can append fields without breaking this server.

use std::fmt;

use thiserror::Error;

use crate::telemetry::{Prediction, SensorReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `u16 co2, u16 tvoc, f32 x 7`
    Sensor,

    /// `f32 human_count, i32 ventilation_state`
    Prediction,
}

impl Layout {
    pub const fn size(&self) -> usize {
        match self {
            Layout::Sensor => 2 * 2 + 7 * 4,
            Layout::Prediction => 4 + 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Sensor => "sensor",
            Layout::Prediction => "prediction",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("{layout} payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        layout: Layout,
        expected: usize,
        actual: usize,
    },

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },
}

pub fn decode_sensor_reading(payload: &[u8]) -> Result<SensorReading, DecodeError> {
    let b = prefix(payload, Layout::Sensor)?;

    Ok(SensorReading {
        co2_ppm: read_u16(b, 0),
        tvoc_ppm: read_u16(b, 2),
        bmp280_temperature: read_rounded(b, 4, "bmp280_temperature")?,
        bmp280_pressure: read_rounded(b, 8, "bmp280_pressure")?,
        mlx_object_temperature: read_rounded(b, 12, "mlx_object_temperature")?,
        mlx_ambient_temperature: read_rounded(b, 16, "mlx_ambient_temperature")?,
        humidity_dht: read_rounded(b, 20, "humidity_dht")?,
        temperature_dht: read_rounded(b, 24, "temperature_dht")?,
        pir_uptime: read_rounded(b, 28, "pir_uptime")?,
    })
}

pub fn decode_prediction(payload: &[u8]) -> Result<Prediction, DecodeError> {
    let b = prefix(payload, Layout::Prediction)?;

    Ok(Prediction {
        // Never stored, so NaN and infinities pass through as sent.
        human_count: round2(read_f32(b, 0)),
        ventilation_state: i32::from_le_bytes([b[4], b[5], b[6], b[7]]),
    })
}

pub fn encode_prediction(prediction: &Prediction) -> Vec<u8> {
    let mut buf = Vec::with_capacity(Layout::Prediction.size());
    buf.extend_from_slice(&prediction.human_count.to_le_bytes());
    buf.extend_from_slice(&prediction.ventilation_state.to_le_bytes());
    buf
}

/// Rounds half away from zero to two decimal places.
pub fn round2(v: f32) -> f32 {
    ((v as f64 * 100.0).round() / 100.0) as f32
}

fn prefix(payload: &[u8], layout: Layout) -> Result<&[u8], DecodeError> {
    payload
        .get(..layout.size())
        .ok_or(DecodeError::TooShort {
            layout,
            expected: layout.size(),
            actual: payload.len(),
        })
}

fn read_u16(b: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([b[offset], b[offset + 1]])
}

fn read_f32(b: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([b[offset], b[offset + 1], b[offset + 2], b[offset + 3]])
}

fn read_rounded(b: &[u8], offset: usize, field: &'static str) -> Result<f32, DecodeError> {
    let v = read_f32(b, offset);
    if !v.is_finite() {
        return Err(DecodeError::NonFinite { field });
    }

    Ok(round2(v))
}
