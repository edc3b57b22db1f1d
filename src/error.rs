//! ==============================================================================
//! error.rs - gateway and pipeline stage errors
//! ==============================================================================
//!
//! none of these are retried. a failed pipeline run leaves the dashboard
//! empty and shows the banner text until the user reloads.
//!
//! ==============================================================================

use thiserror::Error;

/// failure of a single REST call
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("device list request failed: {0}")]
    DeviceListFetchFailed(#[source] GatewayError),

    #[error("no devices registered")]
    EmptyDeviceList,

    #[error("sensor list request for device {device} failed: {source}")]
    SensorListFetchFailed {
        device: String,
        #[source]
        source: GatewayError,
    },

    #[error("value request for {device}/{resource} failed: {source}")]
    SensorValueFetchFailed {
        device: String,
        resource: String,
        #[source]
        source: GatewayError,
    },

    #[error("history request for {device}/{resource} failed: {source}")]
    SensorHistoryFetchFailed {
        device: String,
        resource: String,
        #[source]
        source: GatewayError,
    },
}

impl DashboardError {
    /// text for the loading overlay error banner
    pub fn banner_message(&self) -> &'static str {
        match self {
            Self::DeviceListFetchFailed(_) | Self::EmptyDeviceList => "Error when loading device list!",
            Self::SensorListFetchFailed { .. } => "Error when loading sensors list!",
            Self::SensorValueFetchFailed { .. } => "Error when loading sensor value!",
            Self::SensorHistoryFetchFailed { .. } => "Error when loading sensor statistics!",
        }
    }
}
