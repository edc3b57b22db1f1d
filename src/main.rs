//! ==============================================================================
//! main.rs - sensor dashboard entry point
//! ==============================================================================
//!
//! purpose:
//!     aggregates every sensor of every device registered on a LwM2M REST
//!     server into a grid of cards and serves it as a web dashboard. clicking
//!     a card opens a full-width detail row with the sensor's history chart.
//!
//! responsibilities:
//!     - load dashboard.toml (or defaults) and set up logging
//!     - run the device -> sensor -> value pipeline once at startup
//!     - serve the dashboard and the card toggle api
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                  rust dashboard (this crate)                 │
//!     │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//!     │  │  pipeline   │  │ web server  │  │ controller          │  │
//!     │  │ (3 stages)  │  │ (port 3000) │  │ (cards, grid, panel)│  │
//!     │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  │
//!     │         │                │                    │             │
//!     │         └────────────────┼────────────────────┘             │
//!     │                          │                                  │
//!     │                    ┌─────┴─────┐                            │
//!     │                    │  gateway  │ <- gateway.rs              │
//!     │                    └─────┬─────┘                            │
//!     └──────────────────────────┼──────────────────────────────────┘
//!                                │ http / json
//!                    ┌───────────┴───────────┐
//!                    │  device REST server   │
//!                    │  devices/.../value    │
//!                    └───────────────────────┘
//!
//! ==============================================================================

mod card;
mod config;
mod controller;
mod domain;
mod error;
mod gateway;
mod grid;
mod pipeline;
mod render;
mod rules;
mod server;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Sensor Dashboard");
    println!("  devices -> sensors -> values -> cards");
    println!("===========================================================");

    // step 1: load configuration, then logging (RUST_LOG wins over the file)
    let (config, origin) = config::DashboardConfig::load_or_default();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match origin {
        config::ConfigOrigin::File(path) => tracing::info!(path = %path.display(), "config loaded"),
        config::ConfigOrigin::Defaults { rejected } => {
            for reason in rejected {
                tracing::warn!(%reason, "config file rejected");
            }
            tracing::warn!("no usable config file found - using defaults");
        }
    }
    config.print_summary();

    // step 2: gateway and rule table
    let rules = rules::RuleTable::with_overrides(&config.rules);
    tracing::info!(rules = rules.len(), overrides = config.rules.len(), "rule table ready");
    let gateway = gateway::HttpGateway::new(
        &config.gateway.base_url,
        Duration::from_secs(config.gateway.timeout_seconds),
    )?;
    let ctx = server::ServerContext::new(Arc::new(gateway), rules, config.logging.show_sensor_data);

    // step 3: first pipeline run; a failure is shown on the page, not fatal
    if !server::refresh(&ctx).await {
        tracing::warn!("starting with an empty dashboard, POST /api/reload to retry");
    }

    // step 4: serve until killed
    server::run(ctx, &config.server.bind_address).await
}
