//! Validate configuration command.

use anyhow::Result;
use std::path::Path;
use tradehub_config::Settings;

pub async fn run(settings: &Settings, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => println!("Validating configuration: {}", path.display()),
        None => println!("Validating configuration: defaults, tradehub.toml, environment"),
    }

    settings.validate()?;
    println!("Configuration is valid!");
    println!();

    // Secrets never reach stdout.
    let mut printable = settings.clone();
    for venue in [
        &mut printable.exchanges.binance,
        &mut printable.exchanges.coinbase,
        &mut printable.exchanges.sim,
    ] {
        if !venue.api_key.is_empty() {
            venue.api_key = "***".to_string();
        }
        if !venue.api_secret.is_empty() {
            venue.api_secret = "***".to_string();
        }
    }
    print!("{}", printable.to_toml()?);

    Ok(())
}
