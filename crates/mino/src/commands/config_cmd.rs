//! Config subcommand handlers.

use owo_colors::OwoColorize;

use mino_config::{Config, Profile, clear_password, load_config, save_config, store_password};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;

const REDACTED: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of `cfg` safe to print.
fn redacted(cfg: &Config) -> Config {
    let mut out = cfg.clone();
    for profile in out.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(REDACTED.into());
        }
        if profile.sid.is_some() {
            profile.sid = Some(REDACTED.into());
        }
    }
    out
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let paths = config::paths(global);

    match args.command {
        ConfigCommand::Path => {
            println!("{}", paths.config_file.display());
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = load_config(&paths.config_file)?;
            let rendered = toml::to_string_pretty(&redacted(&cfg)).map_err(|e| {
                CliError::Validation {
                    field: "config".into(),
                    reason: format!("failed to render config: {e}"),
                }
            })?;
            print!("{rendered}");
            Ok(())
        }

        ConfigCommand::Init {
            email,
            prefix,
            community,
            default,
        } => {
            let mut cfg = load_config(&paths.config_file)?;
            let name = cfg.active_profile_name(global.profile.as_deref());

            let profile = cfg.profiles.entry(name.clone()).or_insert_with(|| Profile {
                use_cache: true,
                ..Profile::default()
            });
            profile.email = Some(email);
            if prefix.is_some() {
                profile.command_prefix = prefix;
            }
            if community.is_some() {
                profile.community_id = community;
            }
            // Fails early on a bad prefix or community id.
            profile.to_bot_config(&cfg.defaults, &paths)?;

            if default || cfg.profiles.len() == 1 {
                cfg.default_profile = Some(name.clone());
            }
            save_config(&paths.config_file, &cfg)?;

            if !global.quiet {
                eprintln!(
                    "{} profile '{name}' in {}",
                    "✓ Saved".green(),
                    paths.config_file.display()
                );
                eprintln!("  Store the password with: mino config set-password -p {name}");
            }
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = load_config(&paths.config_file)?;
            let name = cfg.active_profile_name(global.profile.as_deref());
            cfg.profile(&name)?;

            let password = rpassword::prompt_password(format!("Password for '{name}': "))
                .map_err(prompt_err)?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }

            store_password(&name, &password)?;
            if !global.quiet {
                eprintln!("{} password for '{name}' in the system keyring", "✓ Stored".green());
            }
            Ok(())
        }

        ConfigCommand::ClearPassword => {
            let cfg = load_config(&paths.config_file)?;
            let name = cfg.active_profile_name(global.profile.as_deref());
            clear_password(&name)?;
            if !global.quiet {
                eprintln!("{} password for '{name}'", "✓ Removed".green());
            }
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = load_config(&paths.config_file)?;
            let default = cfg.active_profile_name(None);
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: mino config init --email <EMAIL>");
            }
            for name in cfg.profiles.keys() {
                let marker = if *name == default { " *" } else { "" };
                println!("{name}{marker}");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_redacted() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "main".into(),
            Profile {
                email: Some("bot@example.com".into()),
                password: Some("hunter2".into()),
                sid: Some("AnsiMSI6".into()),
                ..Profile::default()
            },
        );

        let shown = redacted(&cfg);
        let main = &shown.profiles["main"];
        assert_eq!(main.password.as_deref(), Some(REDACTED));
        assert_eq!(main.sid.as_deref(), Some(REDACTED));
        assert_eq!(main.email.as_deref(), Some("bot@example.com"));
        assert_eq!(cfg.profiles["main"].password.as_deref(), Some("hunter2"));
    }
}
