//! ==============================================================================
//! card.rs - one card per sensor and its open/close lifecycle
//! ==============================================================================
//!
//! lifecycle:
//!
//!     Closed ──open──> Opening{ticket} ──history ok/failed──> Open
//!       ^                    │                                 │
//!       └──── re-toggle / another card opens ──────────────────┘
//!
//!     a cached history skips Opening and goes straight to Open.
//!     bulb cards never leave Closed; clicking them flips ON/OFF.
//!
//! ==============================================================================

use crate::domain::{DisplayKind, HistoryPoint, SensorRecord};
use crate::rules::RuleEntry;
use serde::{Deserialize, Serialize};

/// ties a history response to the open transition that asked for it
pub type FetchTicket = u64;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CardKey {
    pub device: String,
    pub sensor: String,
}

impl CardKey {
    pub fn new(device: &str, sensor: &str) -> Self {
        Self { device: device.to_string(), sensor: sensor.to_string() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CardState {
    Closed,
    Opening { ticket: FetchTicket },
    Open,
}

/// what the chart adapter needs to draw a series
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartData {
    pub label: String,
    pub units: String,
    pub series: Vec<(i64, f64)>,
}

/// next step after a card starts opening
#[derive(Debug)]
pub enum OpenStep {
    Cached(ChartData),
    Fetch,
}

#[derive(Debug)]
pub struct CardModel {
    key: CardKey,
    sensor: SensorRecord,
    rule: Option<RuleEntry>,
    history: Option<Vec<HistoryPoint>>,
    state: CardState,
    bulb_on: Option<bool>,
}

impl CardModel {
    pub fn new(device: &str, sensor: SensorRecord, rule: Option<RuleEntry>) -> Self {
        let bulb_on = (sensor.kind == DisplayKind::Bulb).then(|| sensor.value.is_on());
        Self {
            key: CardKey::new(device, sensor.id.as_str()),
            sensor,
            rule,
            history: None,
            state: CardState::Closed,
            bulb_on,
        }
    }

    pub fn key(&self) -> &CardKey {
        &self.key
    }

    pub fn device_name(&self) -> &str {
        &self.key.device
    }

    pub fn sensor(&self) -> &SensorRecord {
        &self.sensor
    }

    pub fn rule(&self) -> Option<&RuleEntry> {
        self.rule.as_ref()
    }

    pub fn history(&self) -> Option<&[HistoryPoint]> {
        self.history.as_deref()
    }

    pub fn state(&self) -> CardState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, CardState::Closed)
    }

    pub fn is_bulb(&self) -> bool {
        self.bulb_on.is_some()
    }

    pub fn units(&self) -> &str {
        self.rule().map(|r| r.display_units.as_str()).unwrap_or_default()
    }

    /// heading text, the resource path the value was read from
    pub fn heading(&self) -> &str {
        &self.sensor.resource
    }

    pub fn display_value(&self) -> String {
        match self.bulb_on {
            Some(true) => "ON".to_string(),
            Some(false) => "OFF".to_string(),
            None => self.sensor.value.to_string(),
        }
    }

    /// flip the light state, `None` for cards that are not bulbs
    pub fn toggle_bulb(&mut self) -> Option<bool> {
        let on = self.bulb_on.as_mut()?;
        *on = !*on;
        Some(*on)
    }

    pub fn begin_open(&mut self, ticket: FetchTicket) -> OpenStep {
        match self.chart() {
            Some(chart) => {
                self.state = CardState::Open;
                OpenStep::Cached(chart)
            }
            None => {
                self.state = CardState::Opening { ticket };
                OpenStep::Fetch
            }
        }
    }

    pub fn close(&mut self) {
        self.state = CardState::Closed;
    }

    /// store history if `ticket` is still the pending one
    pub fn accept_history(&mut self, ticket: FetchTicket, points: Vec<HistoryPoint>) -> bool {
        if self.state != (CardState::Opening { ticket }) {
            return false;
        }
        self.history = Some(points);
        self.state = CardState::Open;
        true
    }

    /// a failed fetch still opens the card, the panel just stays empty
    pub fn fail_history(&mut self, ticket: FetchTicket) -> bool {
        if self.state != (CardState::Opening { ticket }) {
            return false;
        }
        self.state = CardState::Open;
        true
    }

    pub fn chart(&self) -> Option<ChartData> {
        let history = self.history()?;
        Some(ChartData {
            label: kind_label(self.sensor.kind).to_string(),
            units: self.units().to_string(),
            series: history.iter().map(|p| (p.timestamp, p.value)).collect(),
        })
    }
}

fn kind_label(kind: DisplayKind) -> &'static str {
    match kind {
        DisplayKind::Temperature => "temperature",
        DisplayKind::Humidity => "humidity",
        DisplayKind::Bulb => "bulb",
        DisplayKind::Unknown => "value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SensorId, SensorValue};
    use crate::rules::RuleTable;

    fn card(raw_id: &str, kind: DisplayKind, value: SensorValue) -> CardModel {
        let id = SensorId::parse(raw_id);
        let rule = RuleTable::builtin().lookup(&id).cloned();
        let resource = rule.as_ref().map(|r| r.resource_for(&id)).unwrap_or_default();
        CardModel::new("node-1", SensorRecord { id, resource, kind, value }, rule)
    }

    fn points() -> Vec<HistoryPoint> {
        vec![
            HistoryPoint { timestamp: 1_000_000, value: 21.5 },
            HistoryPoint { timestamp: 2_000_000, value: 22.0 },
        ]
    }

    #[test]
    fn first_open_needs_a_fetch() {
        let mut c = card(".3303.0", DisplayKind::Temperature, SensorValue::Number(21.5));
        assert!(matches!(c.begin_open(1), OpenStep::Fetch));
        assert_eq!(c.state(), CardState::Opening { ticket: 1 });
        assert!(c.is_open());

        assert!(c.accept_history(1, points()));
        assert_eq!(c.state(), CardState::Open);
        let chart = c.chart().unwrap();
        assert_eq!(chart.label, "temperature");
        assert_eq!(chart.units, "celsius");
        assert_eq!(chart.series, vec![(1_000_000, 21.5), (2_000_000, 22.0)]);
    }

    #[test]
    fn cached_history_opens_immediately() {
        let mut c = card(".3303.0", DisplayKind::Temperature, SensorValue::Number(21.5));
        c.begin_open(1);
        c.accept_history(1, points());
        c.close();

        match c.begin_open(2) {
            OpenStep::Cached(chart) => assert_eq!(chart.series.len(), 2),
            OpenStep::Fetch => panic!("history should be cached"),
        }
        assert_eq!(c.state(), CardState::Open);
    }

    #[test]
    fn outdated_ticket_is_ignored() {
        let mut c = card(".3304.0", DisplayKind::Humidity, SensorValue::Text("40".into()));
        c.begin_open(1);
        c.close();
        c.begin_open(2);

        assert!(!c.accept_history(1, points()));
        assert!(c.history().is_none());
        assert!(!c.fail_history(1));
        assert_eq!(c.state(), CardState::Opening { ticket: 2 });
    }

    #[test]
    fn failed_fetch_leaves_card_open_without_chart() {
        let mut c = card(".3304.0", DisplayKind::Humidity, SensorValue::Text("40".into()));
        c.begin_open(7);
        assert!(c.fail_history(7));
        assert_eq!(c.state(), CardState::Open);
        assert!(c.chart().is_none());
    }

    #[test]
    fn bulbs_flip_their_display_state() {
        let mut c = card(".1024.0", DisplayKind::Bulb, SensorValue::Text("ON".into()));
        assert!(c.is_bulb());
        assert_eq!(c.display_value(), "ON");
        assert_eq!(c.toggle_bulb(), Some(false));
        assert_eq!(c.display_value(), "OFF");
        assert_eq!(c.toggle_bulb(), Some(true));
        assert_eq!(c.units(), "power");
    }

    #[test]
    fn non_bulbs_do_not_toggle() {
        let mut c = card(".3303.0", DisplayKind::Temperature, SensorValue::Number(3.0));
        assert_eq!(c.toggle_bulb(), None);
        assert_eq!(c.display_value(), "3");
        assert_eq!(c.heading(), ".3303.0.5700");
    }
}
