//! CLI command implementations.

pub mod history;
pub mod market;
pub mod portfolio;
pub mod run;
pub mod trade;
pub mod validate;

use anyhow::{bail, Result};
use tradehub_config::Settings;
use tradehub_coordinator::{Coordinator, CoordinatorConfig};

/// Build a coordinator over the enabled venues.
pub(crate) fn connect(settings: &Settings) -> Result<Coordinator> {
    let accounts = settings.accounts();
    if accounts.is_empty() {
        bail!("no venues enabled; enable [exchanges.sim] or configure credentials");
    }
    Ok(Coordinator::connect(
        accounts,
        CoordinatorConfig::from_settings(settings),
    )?)
}
