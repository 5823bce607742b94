//! `mino login` and `mino ping`.

use owo_colors::OwoColorize;

use mino_core::{Account, Bot, Dispatcher};

use crate::cli::{GlobalOpts, LoginArgs};
use crate::config::{self, Resolved};
use crate::error::CliError;

/// Log `bot` in with the resolved profile.
pub async fn login(resolved: &Resolved, bot: &Bot, no_cache: bool) -> Result<Account, CliError> {
    let mut request = resolved
        .login_request()
        .map_err(|e| e.for_profile(&resolved.name))?;
    if no_cache {
        request = request.with_cache(false);
    }

    tracing::info!(profile = %resolved.name, "logging in");
    bot.login(request)
        .await
        .map_err(|e| CliError::from(e).for_profile(&resolved.name))
}

pub async fn handle(args: LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let bot = resolved.bot(Dispatcher::new())?;
    let account = login(&resolved, &bot, args.no_cache).await?;

    if !global.quiet {
        let nickname = account.profile.nickname.as_deref().unwrap_or("(no nickname)");
        println!("{} {}", "Logged in as".green(), nickname.bold());
        println!("  {:<10} {}", "uid".dimmed(), account.profile.uid);
        println!("  {:<10} {}", "device".dimmed(), bot.client().device_id());
        if let Some(level) = account.profile.level {
            println!("  {:<10} {level}", "level".dimmed());
        }
    }
    Ok(())
}

pub async fn ping(global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let bot = resolved.bot(Dispatcher::new())?;
    login(&resolved, &bot, false).await?;

    let millis = bot.ping().await?;
    println!("{} {millis:.0} ms", "pong".green());
    Ok(())
}
