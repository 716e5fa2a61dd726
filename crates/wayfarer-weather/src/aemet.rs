//! AEMET OpenData warning client.
//!
//! AEMET answers in two steps: the warnings endpoint returns an envelope
//! `{estado, descripcion, datos}` and the alert records live behind the
//! `datos` URL.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use wayfarer_core::{FetchError, WeatherConfig};
use wayfarer_fetch::{EndpointSet, FetchRuntime, RequestDescriptor};

use crate::types::{AlertLevel, AlertSource, WeatherAlert};

#[derive(Debug, Deserialize)]
struct AemetEnvelope {
    estado: u16,
    #[serde(default)]
    descripcion: Option<String>,
    #[serde(default)]
    datos: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AemetRecord {
    id: Option<String>,
    zona: Option<String>,
    provincia: Option<String>,
    descripcion: Option<String>,
    nivel: Option<String>,
    inicio: Option<String>,
    fin: Option<String>,
    fenomeno: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AemetClient {
    runtime: FetchRuntime,
    endpoints: EndpointSet,
    api_key: Option<String>,
}

impl AemetClient {
    pub fn new(runtime: FetchRuntime, config: &WeatherConfig) -> Self {
        let endpoints = runtime.endpoint_set("aemet", [config.aemet_base_url.clone()]);
        Self {
            runtime,
            endpoints,
            api_key: config.aemet_api_key.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Latest warnings for an AEMET area code.
    pub async fn fetch_alerts(&self, area: &str) -> Result<Vec<WeatherAlert>, FetchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FetchError::Validation("AEMET API key not configured".into()))?;

        let request = RequestDescriptor::get(format!("/api/avisos_cap/ultimoelaborado/area/{}", area))
            .with_query("api_key", api_key);
        let datos_url = self
            .runtime
            .rotation()
            .execute(&self.endpoints, &request, parse_envelope)
            .await?
            .value;

        tracing::debug!("AEMET area {} data ready", area);

        let datos = self.runtime.endpoint_set("aemet-datos", [datos_url]);
        let alerts = self
            .runtime
            .rotation()
            .execute(&datos, &RequestDescriptor::get(""), parse_records)
            .await?
            .value;

        tracing::info!("AEMET returned {} alerts for area {}", alerts.len(), area);
        Ok(alerts)
    }
}

/// First step: extract the `datos` URL, honouring the envelope status.
pub(crate) fn parse_envelope(body: &str) -> Result<String, FetchError> {
    let envelope: AemetEnvelope =
        serde_json::from_str(body).map_err(|e| FetchError::parse(format!("AEMET envelope: {}", e)))?;

    if envelope.estado != 200 {
        return Err(FetchError::api(
            envelope.estado,
            envelope.descripcion.unwrap_or_else(|| "AEMET error".into()),
        ));
    }

    envelope
        .datos
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| FetchError::parse("AEMET envelope has no datos URL"))
}

/// Second step: the alert records.
pub(crate) fn parse_records(body: &str) -> Result<Vec<WeatherAlert>, FetchError> {
    let records: Vec<AemetRecord> =
        serde_json::from_str(body).map_err(|e| FetchError::parse(format!("AEMET alerts: {}", e)))?;

    Ok(records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let zone = record.zona.unwrap_or_default();
            WeatherAlert {
                source: AlertSource::Aemet,
                id: record
                    .id
                    .unwrap_or_else(|| format!("aemet:{}:{}", zone, index)),
                province: record.provincia,
                description: record.descripcion.unwrap_or_default(),
                level: record
                    .nivel
                    .as_deref()
                    .map(AlertLevel::parse)
                    .unwrap_or(AlertLevel::Unknown),
                start_time: record.inicio.as_deref().and_then(parse_time),
                end_time: record.fin.as_deref().and_then(parse_time),
                phenomenon: record.fenomeno.unwrap_or_default(),
                zone,
            }
        })
        .collect())
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
