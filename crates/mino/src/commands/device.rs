//! `mino device`: offline device id tooling.

use mino_api::Generator;
use mino_config::load_config;

use crate::cli::{DeviceArgs, DeviceCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;

pub fn handle(args: DeviceArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let generator = generator(global)?;

    let device_id = match args.command {
        DeviceCommand::Generate { seed: Some(seed) } => generator.device_id_from_seed(&seed),
        DeviceCommand::Generate { seed: None } => generator.device_id(),
        DeviceCommand::Migrate { device_id } => {
            generator
                .update_device(&device_id)
                .map_err(|e| CliError::Validation {
                    field: "device_id".into(),
                    reason: e.to_string(),
                })?
        }
    };

    println!("{device_id}");
    Ok(())
}

/// Key material from the active profile when there is one, else the
/// key cache and built-in keys.
fn generator(global: &GlobalOpts) -> Result<Generator, CliError> {
    let paths = config::paths(global);
    let cfg = load_config(&paths.config_file)?;
    let name = cfg.active_profile_name(global.profile.as_deref());
    let keys = cfg
        .profiles
        .get(&name)
        .map(|profile| profile.keys.clone())
        .unwrap_or_default();

    Ok(Generator::resolve(&keys, Some(&paths.key_cache()))?)
}
