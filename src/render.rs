//! ==============================================================================
//! render.rs - html for the card grid
//! ==============================================================================
//!
//! purpose:
//!     turns the controller state into the dashboard page. the grid is emitted
//!     in flow order, the detail panel (if any) at its computed slot with the
//!     chart series embedded as json for the charting script.
//!
//! ==============================================================================

use crate::card::CardModel;
use crate::controller::{DashboardController, DetailPanel};
use crate::domain::DisplayKind;
use crate::grid::GridSlot;

const CARD_COLUMNS: &str = "col-12 col-lg-3 col-md-4 col-sm-6 i-card-wrapper";

pub fn page(controller: Option<&DashboardController>, error: Option<&str>) -> String {
    let banner = error
        .map(|msg| format!(r#"<div class="loading-error-msg">{}</div>"#, html_escape(msg)))
        .unwrap_or_default();
    let grid = controller.map(grid).unwrap_or_default();

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>sensor dashboard</title>
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/bootstrap@4.6.2/dist/css/bootstrap.min.css">
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/font-awesome@4.7.0/css/font-awesome.min.css">
<script src="https://cdn.jsdelivr.net/npm/chart.js@4"></script>
</head>
<body>
{banner}
<div class="container device-panel">
<div class="row">
{grid}
</div>
</div>
<script>{script}</script>
</body>
</html>"#,
        banner = banner,
        grid = grid,
        script = SCRIPT,
    )
}

pub fn grid(controller: &DashboardController) -> String {
    let mut out = String::new();
    for slot in controller.grid().slots() {
        match slot {
            GridSlot::Card(key) => {
                if let Some(card) = controller.card(key) {
                    out.push_str(&card_html(card));
                }
            }
            GridSlot::Detail => {
                if let Some(panel) = controller.detail() {
                    out.push_str(&detail_html(panel));
                }
            }
        }
        out.push('\n');
    }
    out
}

fn card_html(card: &CardModel) -> String {
    let mut wrapper = String::from(CARD_COLUMNS);
    let mut inner = String::from("i-card");
    if !card.is_bulb() {
        wrapper.push_str(if card.is_open() { " i-card-details-open" } else { " i-card-details-hide" });
        inner.push_str(" openedable");
    }

    format!(
        r#"<div class="{wrapper}" data-device="{device}" data-sensor="{sensor}"><div class="{inner}"><div class="i-card-heading"><h1 class="h4 i-card-heading-text">{heading}</h1></div><div class="i-card-logo"><i class="fa {icon} i-card-logo-icon"></i></div><div class="i-card-content"><div class="sensor-value"><h2>{value}</h2><h3>{units}</h3></div></div></div></div>"#,
        wrapper = wrapper,
        inner = inner,
        device = html_escape(card.device_name()),
        sensor = html_escape(card.sensor().id.as_str()),
        heading = html_escape(card.heading()),
        icon = icon(card.sensor().kind),
        value = html_escape(&card.display_value()),
        units = html_escape(card.units()),
    )
}

fn detail_html(panel: &DetailPanel) -> String {
    let series = panel
        .chart
        .as_ref()
        .and_then(|chart| serde_json::to_string(chart).ok())
        .unwrap_or_default();
    let style = if panel.visible { "" } else { r#" style="display: none;""# };

    format!(
        r#"<div class="col-12 col-md-12 col-sm-12"{style}><div class="i-card i-details-card p-3"><canvas class="param-chart" data-chart="{series}"></canvas></div></div>"#,
        style = style,
        series = html_escape(&series),
    )
}

fn icon(kind: DisplayKind) -> &'static str {
    match kind {
        DisplayKind::Temperature => "fa-thermometer-three-quarters",
        DisplayKind::Humidity => "fa-tint",
        DisplayKind::Bulb => "fa-lightbulb-o",
        DisplayKind::Unknown => "fa-question",
    }
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// posts live widths on click, then re-renders from the server state
const SCRIPT: &str = r#"
document.querySelectorAll('.i-card-wrapper').forEach(function (wrap) {
  wrap.addEventListener('click', function () {
    var panel = document.querySelector('.device-panel');
    var url = 'api/devices/' + encodeURIComponent(wrap.dataset.device) +
      '/sensors/' + encodeURIComponent(wrap.dataset.sensor) + '/toggle';
    fetch(url, {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: JSON.stringify({container_width: panel.clientWidth, card_width: wrap.offsetWidth})
    }).then(function () { location.reload(); });
  });
});
document.querySelectorAll('canvas.param-chart').forEach(function (canvas) {
  if (!canvas.dataset.chart) { return; }
  var chart = JSON.parse(canvas.dataset.chart);
  new Chart(canvas, {
    type: 'line',
    data: {
      labels: chart.series.map(function (p) { return new Date(p[0]).toLocaleString(); }),
      datasets: [{label: chart.label + ' (' + chart.units + ')', fill: true,
        data: chart.series.map(function (p) { return p[1]; })}]
    },
    options: {responsive: true, maintainAspectRatio: false}
  });
});
"#;
