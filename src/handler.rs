//! Endpoint handlers. Every failure collapses to `4.06 Not Acceptable`;
//! nodes only distinguish accepted from rejected.

use coap_lite::ResponseType;
use sqlx::SqlitePool;
use tracing::{Level, debug, info, warn};

use crate::{
    cache::PredictionCache,
    codec::{decode_prediction, decode_sensor_reading, encode_prediction},
    db::{count_readings, insert_reading},
};

pub const ACCEPTED: ResponseType = ResponseType::Changed;
pub const REJECTED: ResponseType = ResponseType::NotAcceptable;

pub async fn post_data(pool: &SqlitePool, payload: &[u8]) -> ResponseType {
    let reading = match decode_sensor_reading(payload) {
        Ok(r) => r,
        Err(err) => {
            warn!("rejected /data payload: {err}");
            return REJECTED;
        }
    };

    let id = match insert_reading(pool, &reading).await {
        Ok(id) => id,
        Err(err) => {
            warn!("rejected /data payload: {err:#}");
            return REJECTED;
        }
    };

    info!(id, ?reading, "stored sensor reading");

    if tracing::enabled!(Level::DEBUG) {
        match count_readings(pool).await {
            Ok(total) => debug!(total, "sensor_data rows"),
            Err(err) => debug!("failed to count readings: {err:#}"),
        }
    }

    ACCEPTED
}

pub fn post_prediction(cache: &PredictionCache, payload: &[u8]) -> ResponseType {
    let prediction = match decode_prediction(payload) {
        Ok(p) => p,
        Err(err) => {
            warn!("rejected /predictions payload: {err}");
            return REJECTED;
        }
    };

    info!(?prediction, "updated latest prediction");
    cache.set_prediction(prediction);

    ACCEPTED
}

/// Returns the cached prediction in the same 8-byte layout nodes post.
pub fn get_prediction(cache: &PredictionCache) -> (ResponseType, Vec<u8>) {
    match cache.get_prediction() {
        Some(prediction) => (ResponseType::Content, encode_prediction(&prediction)),
        None => (ResponseType::NotFound, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::tests::sensor_payload,
        db::{
            list_readings,
            tests::{memory_pool, reading},
        },
        telemetry::Prediction,
    };

    fn prediction_payload(human_count: f32, ventilation_state: i32) -> Vec<u8> {
        encode_prediction(&Prediction {
            human_count,
            ventilation_state,
        })
    }

    #[tokio::test]
    async fn test_post_data_stores_rounded_reading() {
        let pool = memory_pool().await;
        let payload = sensor_payload((
            412,
            5,
            [21.45, 1013.25, 20.0, 22.0, 45.6, 21.4, 120.0],
        ));

        assert_eq!(post_data(&pool, &payload).await, ACCEPTED);

        let stored = list_readings(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].reading, reading());
    }

    #[tokio::test]
    async fn test_post_data_rejects_short_payload() {
        let pool = memory_pool().await;

        assert_eq!(post_data(&pool, &[1, 2, 3]).await, REJECTED);
        assert!(list_readings(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_data_rejects_on_store_failure() {
        let pool = memory_pool().await;
        sqlx::query("DROP TABLE sensor_data")
            .execute(&pool)
            .await
            .unwrap();
        let payload = sensor_payload((400, 0, [1.0; 7]));

        assert_eq!(post_data(&pool, &payload).await, REJECTED);
    }

    #[tokio::test]
    async fn test_post_data_is_not_idempotent() {
        let pool = memory_pool().await;
        let payload = sensor_payload((400, 0, [1.0; 7]));

        assert_eq!(post_data(&pool, &payload).await, ACCEPTED);
        assert_eq!(post_data(&pool, &payload).await, ACCEPTED);

        let stored = list_readings(&pool).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_ne!(stored[0].id, stored[1].id);
    }

    #[tokio::test]
    async fn test_post_data_uses_prefix_of_oversized_payload() {
        let pool = memory_pool().await;
        let mut payload = sensor_payload((
            412,
            5,
            [21.45, 1013.25, 20.0, 22.0, 45.6, 21.4, 120.0],
        ));
        payload.extend_from_slice(&[0xab; 8]);
        assert_eq!(payload.len(), 40);

        assert_eq!(post_data(&pool, &payload).await, ACCEPTED);

        let stored = list_readings(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].reading, reading());
    }

    #[test]
    fn test_post_prediction_uses_prefix_of_oversized_payload() {
        let cache = PredictionCache::new();
        let mut payload = prediction_payload(3.0, 1);
        payload.extend_from_slice(&[0x7f; 4]);
        assert_eq!(payload.len(), 12);

        assert_eq!(post_prediction(&cache, &payload), ACCEPTED);

        assert_eq!(
            cache.get_prediction(),
            Some(Prediction {
                human_count: 3.0,
                ventilation_state: 1,
            })
        );
    }

    #[test]
    fn test_post_prediction_accepts_nan_count() {
        let cache = PredictionCache::new();

        assert_eq!(post_prediction(&cache, &prediction_payload(f32::NAN, 1)), ACCEPTED);

        let cached = cache.get_prediction().unwrap();
        assert!(cached.human_count.is_nan());
        assert_eq!(cached.ventilation_state, 1);
    }

    #[test]
    fn test_post_prediction_overwrites() {
        let cache = PredictionCache::new();

        assert_eq!(post_prediction(&cache, &prediction_payload(1.0, 0)), ACCEPTED);
        assert_eq!(post_prediction(&cache, &prediction_payload(3.0, 1)), ACCEPTED);

        assert_eq!(
            cache.get_prediction(),
            Some(Prediction {
                human_count: 3.0,
                ventilation_state: 1,
            })
        );
    }

    #[test]
    fn test_post_prediction_rejects_short_payload_without_touching_cache() {
        let cache = PredictionCache::new();
        assert_eq!(post_prediction(&cache, &prediction_payload(2.0, 1)), ACCEPTED);

        assert_eq!(post_prediction(&cache, &[0, 0, 0]), REJECTED);

        assert_eq!(
            cache.get_prediction(),
            Some(Prediction {
                human_count: 2.0,
                ventilation_state: 1,
            })
        );
    }

    #[test]
    fn test_get_prediction() {
        let cache = PredictionCache::new();
        assert_eq!(get_prediction(&cache), (ResponseType::NotFound, Vec::new()));

        post_prediction(&cache, &prediction_payload(3.0, 1));

        let (status, payload) = get_prediction(&cache);
        assert_eq!(status, ResponseType::Content);
        assert_eq!(
            decode_prediction(&payload).unwrap(),
            Prediction {
                human_count: 3.0,
                ventilation_state: 1,
            }
        );
    }
}
