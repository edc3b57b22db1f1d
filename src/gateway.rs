//! ==============================================================================
//! gateway.rs - remote lookup gateway for the device REST server
//! ==============================================================================
//!
//! purpose:
//!     one network call per logical lookup:
//!     - GET devices/list                            -> {"data": [name, ..]}
//!     - GET devices/{dev}/sensors/list              -> {"data": [id, ..]}
//!     - GET devices/{dev}/sensors/{res}/value       -> {"data": {type, value}}
//!     - GET devices/{dev}/sensors/{res}/stat        -> {"data": [{secs: value}, ..]}
//!
//! relationships:
//!     - used by: pipeline.rs (stages 1-3), server.rs (history on card open)
//!     - implemented by: HttpGateway (reqwest), tests use ScriptedGateway
//!
//! ==============================================================================

use crate::domain::{HistoryPoint, ValueReading};
use crate::error::GatewayError;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, PercentEncode, CONTROLS};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

#[async_trait]
pub trait LookupGateway: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<String>, GatewayError>;
    async fn list_sensors(&self, device: &str) -> Result<Vec<String>, GatewayError>;
    async fn sensor_value(&self, device: &str, resource: &str) -> Result<ValueReading, GatewayError>;
    async fn sensor_history(&self, device: &str, resource: &str) -> Result<Vec<HistoryPoint>, GatewayError>;
}

// ==============================================================================
// url layout
// ==============================================================================
// device names and resource paths are single path segments. anything that
// would end or split a segment is percent-encoded; dots stay readable.

const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn segment(raw: &str) -> PercentEncode<'_> {
    utf8_percent_encode(raw, SEGMENT)
}

pub fn devices_list_path() -> String {
    "devices/list".to_string()
}

pub fn sensors_list_path(device: &str) -> String {
    format!("devices/{}/sensors/list", segment(device))
}

pub fn sensor_value_path(device: &str, resource: &str) -> String {
    format!("devices/{}/sensors/{}/value", segment(device), segment(resource))
}

pub fn sensor_stat_path(device: &str, resource: &str) -> String {
    format!("devices/{}/sensors/{}/stat", segment(device), segment(resource))
}

/// every REST answer wraps its payload in `data`
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

// ==============================================================================
// history transform
// ==============================================================================
// the stat endpoint returns single-key objects keyed by unix seconds. values
// come back as strings or numbers depending on the client object.

pub fn decode_history(entries: Vec<Map<String, Value>>) -> Result<Vec<HistoryPoint>, GatewayError> {
    let mut points = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some((key, value)) = entry.into_iter().next() else {
            continue;
        };

        let seconds: i64 = key
            .trim()
            .parse()
            .map_err(|_| GatewayError::Decode(format!("bad history timestamp {:?}", key)))?;
        let timestamp = seconds
            .checked_mul(1000)
            .ok_or_else(|| GatewayError::Decode(format!("history timestamp {} out of range", seconds)))?;

        points.push(HistoryPoint { timestamp, value: numeric(&value)? });
    }

    Ok(points)
}

fn numeric(value: &Value) -> Result<f64, GatewayError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>().ok().or_else(|| s.replace(',', ".").parse().ok())
        }
        _ => None,
    };
    parsed.ok_or_else(|| GatewayError::Decode(format!("non-numeric history value {}", value)))
}

// ==============================================================================
// http implementation
// ==============================================================================

#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self { client, base_url })
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::trace!(%url, "gateway request");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| GatewayError::Http { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status { url, status: status.as_u16() });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| GatewayError::Http { url: url.clone(), source })?;

        let envelope: Envelope<T> =
            serde_json::from_slice(&body).map_err(|e| GatewayError::Decode(format!("{}: {}", url, e)))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl LookupGateway for HttpGateway {
    async fn list_devices(&self) -> Result<Vec<String>, GatewayError> {
        self.get_data(&devices_list_path()).await
    }

    async fn list_sensors(&self, device: &str) -> Result<Vec<String>, GatewayError> {
        self.get_data(&sensors_list_path(device)).await
    }

    async fn sensor_value(&self, device: &str, resource: &str) -> Result<ValueReading, GatewayError> {
        self.get_data(&sensor_value_path(device, resource)).await
    }

    async fn sensor_history(&self, device: &str, resource: &str) -> Result<Vec<HistoryPoint>, GatewayError> {
        let entries: Vec<Map<String, Value>> = self.get_data(&sensor_stat_path(device, resource)).await?;
        decode_history(entries)
    }
}

// ==============================================================================
// scripted gateway for tests
// ==============================================================================


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SensorValue;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    fn entries(raw: Value) -> Vec<Map<String, Value>> {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn history_seconds_become_milliseconds() {
        let points = decode_history(entries(json!([{"1000": "21.5"}, {"2000": "22"}]))).unwrap();
        assert_eq!(
            points,
            vec![
                HistoryPoint { timestamp: 1_000_000, value: 21.5 },
                HistoryPoint { timestamp: 2_000_000, value: 22.0 },
            ]
        );
    }

    #[test]
    fn history_accepts_numbers_and_skips_empty_entries() {
        let points = decode_history(entries(json!([{"5": 1}, {}, {"6": "23,5"}]))).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], HistoryPoint { timestamp: 5000, value: 1.0 });
        assert_eq!(points[1].value, 23.5);
    }

    #[test]
    fn history_rejects_garbage() {
        assert!(matches!(
            decode_history(entries(json!([{"yesterday": 1}]))),
            Err(GatewayError::Decode(_))
        ));
        assert!(matches!(
            decode_history(entries(json!([{"10": "warm"}]))),
            Err(GatewayError::Decode(_))
        ));
        assert!(matches!(
            decode_history(entries(json!([{"10": null}]))),
            Err(GatewayError::Decode(_))
        ));
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        assert_eq!(sensors_list_path("node-1"), "devices/node-1/sensors/list");
        assert_eq!(sensors_list_path("a/b?c"), "devices/a%2Fb%3Fc/sensors/list");
        assert_eq!(sensor_value_path("node-1", ".3303.0.5700"), "devices/node-1/sensors/.3303.0.5700/value");
        assert_eq!(sensor_stat_path("my node#1", "50%"), "devices/my%20node%231/sensors/50%25/stat");
    }

    // a tiny stand-in for the REST server
    async fn spawn_fake_server() -> String {
        let app = Router::new()
            .route("/devices/list", get(|| async { Json(json!({"data": ["node-1"]})) }))
            .route(
                "/devices/:dev/sensors/list",
                get(|Path(dev): Path<String>| async move {
                    if dev == "node-1" || dev == "hall/2 east" {
                        Ok(Json(json!({"data": [".3303.0", ".3.0"]})))
                    } else {
                        Err(StatusCode::NOT_FOUND)
                    }
                }),
            )
            .route(
                "/devices/:dev/sensors/:res/value",
                get(|Path((_dev, res)): Path<(String, String)>| async move {
                    if res == ".3303.0.5700" {
                        Json(json!({"data": {"type": "temp", "value": 21.5}})).into_response()
                    } else {
                        // 200 with a body that is not json at all
                        "Not Found".into_response()
                    }
                }),
            )
            .route(
                "/devices/:dev/sensors/:res/stat",
                get(|| async { Json(json!({"data": [{"1000": "21.5"}, {"2000": 22}]})) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn http_gateway_walks_the_rest_api() {
        let base = spawn_fake_server().await;
        let gateway = HttpGateway::new(&base, Duration::from_secs(5)).unwrap();

        assert_eq!(gateway.list_devices().await.unwrap(), vec!["node-1".to_string()]);
        assert_eq!(
            gateway.list_sensors("node-1").await.unwrap(),
            vec![".3303.0".to_string(), ".3.0".to_string()]
        );

        let reading = gateway.sensor_value("node-1", ".3303.0.5700").await.unwrap();
        assert_eq!(reading.value, SensorValue::Number(21.5));

        let history = gateway.sensor_history("node-1", ".3303.0.5700").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], HistoryPoint { timestamp: 2_000_000, value: 22.0 });
    }

    #[tokio::test]
    async fn http_gateway_reports_status_and_decode_failures() {
        let base = spawn_fake_server().await;
        let gateway = HttpGateway::new(&format!("{}/", base), Duration::from_secs(5)).unwrap();

        match gateway.list_sensors("node-9").await {
            Err(GatewayError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {:?}", other.map(|_| ())),
        }
        assert!(matches!(
            gateway.sensor_value("node-1", ".3304.0.5700").await,
            Err(GatewayError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn http_gateway_keeps_odd_device_names_in_one_segment() {
        let base = spawn_fake_server().await;
        let gateway = HttpGateway::new(&base, Duration::from_secs(5)).unwrap();

        assert_eq!(gateway.list_sensors("hall/2 east").await.unwrap().len(), 2);
    }
}
