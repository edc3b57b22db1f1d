//! ==============================================================================
//! pipeline.rs - three stage aggregation of devices, sensors and values
//! ==============================================================================
//!
//! purpose:
//!     turns the REST server's three levels of lookups into one consistent
//!     model. every stage fans out its calls, waits for all of them (or the
//!     first failure) and only then hands over to the next stage:
//!
//!     ┌────────────────┐   ┌──────────────────────┐   ┌───────────────────────┐
//!     │ 1. devices/list│──>│ 2. sensors/list x dev│──>│ 3. rule filter,       │
//!     │                │   │    (all or nothing)  │   │    value x sensor x dev│
//!     └────────────────┘   └──────────────────────┘   └───────────────────────┘
//!
//!     a failing stage stops the run; nothing from a failed run is exposed.
//!
//! relationships:
//!     - uses: gateway.rs (LookupGateway), rules.rs (RuleTable)
//!     - produces: Dashboard (device map + one CardModel per sensor)
//!
//! ==============================================================================

use crate::card::CardModel;
use crate::domain::{DeviceMap, DeviceRecord, DisplayKind, SensorId, SensorRecord};
use crate::error::DashboardError;
use crate::gateway::LookupGateway;
use crate::rules::{RuleEntry, RuleTable};

use futures::future::try_join_all;
use std::collections::HashSet;

/// result of one successful pipeline run
#[derive(Debug)]
pub struct Dashboard {
    pub devices: DeviceMap,
    /// cards in flow order: discovery order of devices, then sensor order
    pub cards: Vec<CardModel>,
}

impl Dashboard {
    pub fn sensor_count(&self) -> usize {
        self.devices.values().map(|d| d.sensors.len()).sum()
    }
}

/// sensor ids of one device that survived rule filtering, in listing order
struct DeviceListing {
    name: String,
    sensors: Vec<(SensorId, RuleEntry)>,
}

pub struct Aggregator<'a, G: LookupGateway + ?Sized> {
    gateway: &'a G,
    rules: &'a RuleTable,
}

impl<'a, G: LookupGateway + ?Sized> Aggregator<'a, G> {
    pub fn new(gateway: &'a G, rules: &'a RuleTable) -> Self {
        Self { gateway, rules }
    }

    pub async fn run(&self) -> Result<Dashboard, DashboardError> {
        let devices = self.discover_devices().await?;
        let listings = self.enumerate_sensors(devices).await?;
        let records = self.fetch_values(listings).await?;
        Ok(self.assemble(records))
    }

    // stage 1
    async fn discover_devices(&self) -> Result<Vec<String>, DashboardError> {
        let devices = self
            .gateway
            .list_devices()
            .await
            .map_err(DashboardError::DeviceListFetchFailed)?;

        if devices.is_empty() {
            tracing::warn!("device list is empty");
            return Err(DashboardError::EmptyDeviceList);
        }

        // a name listed twice is still one device
        let listed = devices.len();
        let mut seen = HashSet::new();
        let devices: Vec<String> = devices.into_iter().filter(|name| seen.insert(name.clone())).collect();
        if devices.len() < listed {
            tracing::debug!(listed, unique = devices.len(), "repeated device names collapsed");
        }
        tracing::info!(count = devices.len(), "discovered devices");
        Ok(devices)
    }

    // stage 2: one sensors/list call per device, any failure fails the stage
    async fn enumerate_sensors(&self, devices: Vec<String>) -> Result<Vec<DeviceListing>, DashboardError> {
        let calls = devices.into_iter().map(|name| async move {
            match self.gateway.list_sensors(&name).await {
                Ok(ids) => Ok(self.filter(name, ids)),
                Err(source) => Err(DashboardError::SensorListFetchFailed { device: name, source }),
            }
        });

        let listings = try_join_all(calls).await?;
        tracing::info!(
            devices = listings.len(),
            sensors = listings.iter().map(|l| l.sensors.len()).sum::<usize>(),
            "enumerated sensors"
        );
        Ok(listings)
    }

    /// drop ids without a rule (and repeats), keep listing order
    fn filter(&self, name: String, ids: Vec<String>) -> DeviceListing {
        let mut seen = HashSet::new();
        let mut sensors = Vec::with_capacity(ids.len());
        let mut dropped = 0usize;

        for raw in ids {
            if !seen.insert(raw.clone()) {
                continue;
            }
            let id = SensorId::parse(&raw);
            match self.rules.lookup(&id) {
                Some(rule) => sensors.push((id, rule.clone())),
                None => {
                    tracing::trace!(
                        device = %name,
                        prefix = id.device_segment(),
                        object = id.type_segment().unwrap_or("-"),
                        instance = id.instance_segment().unwrap_or("-"),
                        "no rule for sensor id"
                    );
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            tracing::debug!(device = %name, dropped, "sensor ids without a rule skipped");
        }
        DeviceListing { name, sensors }
    }

    // stage 3: value fetch per surviving sensor, fan-in per device then overall
    async fn fetch_values(&self, listings: Vec<DeviceListing>) -> Result<Vec<DeviceRecord>, DashboardError> {
        let devices = listings.into_iter().map(|listing| self.fetch_device_values(listing));
        let records = try_join_all(devices).await?;
        tracing::info!(devices = records.len(), "fetched sensor values");
        Ok(records)
    }

    async fn fetch_device_values(&self, listing: DeviceListing) -> Result<DeviceRecord, DashboardError> {
        let DeviceListing { name, sensors } = listing;
        let device = name.as_str();

        let calls = sensors.into_iter().map(|(id, rule)| async move {
            let resource = rule.resource_for(&id);
            match self.gateway.sensor_value(device, &resource).await {
                Ok(reading) => {
                    let reported = reading
                        .reported_type
                        .as_deref()
                        .map(DisplayKind::from_reported)
                        .unwrap_or(DisplayKind::Unknown);
                    let kind = if reported == DisplayKind::Unknown { rule.display_kind } else { reported };
                    Ok(SensorRecord { id, resource, kind, value: reading.value })
                }
                Err(source) => Err(DashboardError::SensorValueFetchFailed {
                    device: device.to_string(),
                    resource,
                    source,
                }),
            }
        });

        let sensors = try_join_all(calls).await?;
        Ok(DeviceRecord { name, sensors })
    }

    fn assemble(&self, records: Vec<DeviceRecord>) -> Dashboard {
        let mut cards = Vec::new();
        for device in &records {
            for sensor in &device.sensors {
                let rule = self.rules.lookup(&sensor.id).cloned();
                cards.push(CardModel::new(&device.name, sensor.clone(), rule));
            }
        }

        let devices = records.into_iter().map(|d| (d.name.clone(), d)).collect();
        Dashboard { devices, cards }
    }
}
