//! Long-running service command implementation.

use anyhow::Result;
use tracing::info;
use tradehub_config::Settings;

use crate::cli::RunArgs;

pub async fn run(args: RunArgs, settings: &Settings) -> Result<()> {
    let hub = super::connect(settings)?;

    if args.auto_profit {
        hub.enable_auto_profit(settings.engine.policy());
    }

    info!("coordinator running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    hub.shutdown();
    Ok(())
}
