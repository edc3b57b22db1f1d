//! ==============================================================================
//! controller.rs - card interactions over one pipeline run
//! ==============================================================================
//!
//! purpose:
//!     owns the dashboard produced by a pipeline run, the grid flow and the
//!     single detail panel. every open/close goes through here so that at most
//!     one card is open and at most one panel exists.
//!
//!     history fetches happen outside the controller: `toggle` hands out a
//!     HistoryRequest, the caller awaits the gateway, then feeds the result to
//!     `apply_history`. a response whose ticket is no longer current is dropped.
//!
//! relationships:
//!     - uses: grid.rs (placement), card.rs (state machine)
//!     - used by: server.rs (toggle endpoint), render.rs (page)
//!
//! ==============================================================================

use crate::card::{CardKey, CardModel, ChartData, FetchTicket, OpenStep};
use crate::domain::{DeviceMap, HistoryPoint};
use crate::error::{DashboardError, GatewayError};
use crate::gateway::LookupGateway;
use crate::grid::{CardGrid, GridPlacement, LayoutMetrics};
use crate::pipeline::Dashboard;

use serde::Serialize;
use std::collections::HashMap;

/// the full-width panel showing one card's chart
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetailPanel {
    pub owner: CardKey,
    pub visible: bool,
    pub chart: Option<ChartData>,
}

impl DetailPanel {
    fn hidden(owner: CardKey) -> Self {
        Self { owner, visible: false, chart: None }
    }

    fn reveal(&mut self) {
        self.visible = true;
    }

    fn draw(&mut self, chart: ChartData) {
        self.chart = Some(chart);
    }
}

/// pending history lookup for the card being opened
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRequest {
    pub key: CardKey,
    pub resource: String,
    pub ticket: FetchTicket,
}

#[derive(Debug)]
pub enum ToggleOutcome {
    /// history was cached, the chart is already drawn
    Opened { placement: GridPlacement, detail_slot: usize },
    /// panel is placed and visible, history still has to be fetched
    Opening { placement: GridPlacement, detail_slot: usize, request: HistoryRequest },
    Closed,
    BulbSwitched { on: bool },
}

#[derive(Debug, PartialEq)]
pub enum HistoryApplied {
    Rendered(ChartData),
    /// the card was closed or reopened while the fetch was in flight
    Stale,
}

pub struct DashboardController {
    dashboard: Dashboard,
    index: HashMap<CardKey, usize>,
    grid: CardGrid,
    detail: Option<DetailPanel>,
    next_ticket: FetchTicket,
}

impl DashboardController {
    pub fn new(dashboard: Dashboard) -> Self {
        let index = dashboard
            .cards
            .iter()
            .enumerate()
            .map(|(i, card)| (card.key().clone(), i))
            .collect();
        let grid = CardGrid::new(dashboard.cards.iter().map(|c| c.key().clone()));

        Self { dashboard, index, grid, detail: None, next_ticket: 1 }
    }

    pub fn devices(&self) -> &DeviceMap {
        &self.dashboard.devices
    }

    pub fn cards(&self) -> &[CardModel] {
        &self.dashboard.cards
    }

    pub fn card(&self, key: &CardKey) -> Option<&CardModel> {
        self.index.get(key).map(|&i| &self.dashboard.cards[i])
    }

    pub fn grid(&self) -> &CardGrid {
        &self.grid
    }

    pub fn detail(&self) -> Option<&DetailPanel> {
        self.detail.as_ref()
    }

    pub fn open_card(&self) -> Option<&CardModel> {
        self.dashboard.cards.iter().find(|c| c.is_open())
    }

    /// click on a card; `None` when no such card exists
    pub fn toggle(&mut self, key: &CardKey, metrics: LayoutMetrics) -> Option<ToggleOutcome> {
        let target = *self.index.get(key)?;

        if let Some(on) = self.dashboard.cards[target].toggle_bulb() {
            tracing::debug!(device = %key.device, sensor = %key.sensor, on, "bulb toggled");
            return Some(ToggleOutcome::BulbSwitched { on });
        }

        let was_open = self.dashboard.cards[target].is_open();

        self.grid.remove_detail();
        self.detail = None;
        for (i, card) in self.dashboard.cards.iter_mut().enumerate() {
            if i != target && card.is_open() {
                card.close();
            }
        }

        if was_open {
            self.dashboard.cards[target].close();
            return Some(ToggleOutcome::Closed);
        }

        let (placement, detail_slot) = self.grid.open_detail_for(key, metrics)?;
        let panel = self.detail.insert(DetailPanel::hidden(key.clone()));

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let card = &mut self.dashboard.cards[target];
        let outcome = match card.begin_open(ticket) {
            OpenStep::Cached(chart) => {
                panel.draw(chart);
                ToggleOutcome::Opened { placement, detail_slot }
            }
            OpenStep::Fetch => ToggleOutcome::Opening {
                placement,
                detail_slot,
                request: HistoryRequest {
                    key: key.clone(),
                    resource: card.sensor().resource.clone(),
                    ticket,
                },
            },
        };
        panel.reveal();

        tracing::debug!(
            device = %key.device,
            sensor = %key.sensor,
            columns = placement.columns_per_row,
            detail_slot,
            "card opened"
        );
        Some(outcome)
    }

    pub fn apply_history(
        &mut self,
        request: &HistoryRequest,
        result: Result<Vec<HistoryPoint>, GatewayError>,
    ) -> Result<HistoryApplied, DashboardError> {
        let Some(&i) = self.index.get(&request.key) else {
            return Ok(HistoryApplied::Stale);
        };
        let card = &mut self.dashboard.cards[i];
        let panel = match self.detail.as_mut() {
            Some(panel) if panel.owner == request.key => panel,
            _ => {
                tracing::debug!(sensor = %request.key.sensor, ticket = request.ticket, "history for closed card dropped");
                return Ok(HistoryApplied::Stale);
            }
        };

        match result {
            Ok(points) => {
                if !card.accept_history(request.ticket, points) {
                    tracing::debug!(sensor = %request.key.sensor, ticket = request.ticket, "outdated history dropped");
                    return Ok(HistoryApplied::Stale);
                }
                let chart = card.chart().unwrap_or_else(|| ChartData {
                    label: String::new(),
                    units: String::new(),
                    series: Vec::new(),
                });
                panel.chart = None;
                panel.draw(chart.clone());
                Ok(HistoryApplied::Rendered(chart))
            }
            Err(source) => {
                if !card.fail_history(request.ticket) {
                    return Ok(HistoryApplied::Stale);
                }
                Err(DashboardError::SensorHistoryFetchFailed {
                    device: request.key.device.clone(),
                    resource: request.resource.clone(),
                    source,
                })
            }
        }
    }
}

/// issue the stat lookup for a pending open
pub async fn fetch_history<G: LookupGateway + ?Sized>(
    gateway: &G,
    request: &HistoryRequest,
) -> Result<Vec<HistoryPoint>, GatewayError> {
    gateway.sensor_history(&request.key.device, &request.resource).await
}
