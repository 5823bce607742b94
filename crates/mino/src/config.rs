//! Profile resolution for the CLI: config file + global flags -> `Bot`.

use mino_config::{Config, Paths, Profile, load_config};
use mino_core::{Bot, BotConfig, Dispatcher, LoginRequest};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config and data locations, honouring `--config`.
pub fn paths(global: &GlobalOpts) -> Paths {
    let mut paths = Paths::platform();
    if let Some(ref file) = global.config {
        paths.config_file.clone_from(file);
    }
    paths
}

/// A profile with everything needed to build a bot.
#[derive(Debug)]
pub struct Resolved {
    pub name: String,
    pub profile: Profile,
    pub config: Config,
    pub paths: Paths,
}

impl Resolved {
    pub fn bot_config(&self) -> Result<BotConfig, CliError> {
        Ok(self.profile.to_bot_config(&self.config.defaults, &self.paths)?)
    }

    pub fn login_request(&self) -> Result<LoginRequest, CliError> {
        Ok(mino_config::login_request(&self.profile, &self.name)?)
    }

    /// Build a bot for this profile. No network activity.
    pub fn bot(&self, dispatcher: Dispatcher) -> Result<Bot, CliError> {
        Ok(Bot::new(self.bot_config()?, dispatcher)?)
    }
}

/// Load the config and pick the active profile.
///
/// A missing profile is tolerated when `MINO_SID` is set so one-off
/// runs work without a config file.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let paths = paths(global);
    let config = load_config(&paths.config_file)?;
    let name = config.active_profile_name(global.profile.as_deref());

    let profile = match config.profile(&name) {
        Ok(profile) => profile.clone(),
        Err(_) if std::env::var_os("MINO_SID").is_some() => Profile {
            use_cache: false,
            ..Profile::default()
        },
        Err(e) => return Err(e.into()),
    };

    Ok(Resolved {
        name,
        profile,
        config,
        paths,
    })
}
