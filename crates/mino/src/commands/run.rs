//! `mino run`: connect the built-in bot and serve until Ctrl-C.

use std::time::Duration;

use owo_colors::OwoColorize;
use tracing::{info, warn};

use mino_core::{Bot, Command, Context, CoreError, Dispatcher, EventName, parse_community_id};

use crate::cli::{GlobalOpts, RunArgs};
use crate::commands::login::login;
use crate::config;
use crate::error::CliError;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;

    let mut bot_config = resolved.bot_config()?;
    if let Some(prefix) = args.prefix {
        bot_config.command_prefix = prefix;
    }
    bot_config.intents |= args.intents;
    bot_config.online_status |= args.online;

    let bot = Bot::new(bot_config, builtin_dispatcher()?)?;
    let account = login(&resolved, &bot, false).await?;

    if let Some(ref community) = args.community {
        let id = match parse_community_id(community) {
            Ok(_) => bot.set_community_id(community)?,
            Err(_) => bot.fetch_community_id(community).await?,
        };
        info!(community = id, "working community set");
    }

    if !global.quiet {
        let nickname = account.profile.nickname.as_deref().unwrap_or("bot");
        eprintln!(
            "{} {} {}",
            "Running".green(),
            nickname.bold(),
            "(Ctrl-C to stop)".dimmed()
        );
    }

    let result = tokio::select! {
        result = bot.run() => result.map_err(CliError::from),
        interrupted = tokio::signal::ctrl_c() => {
            info!("shutting down");
            interrupted.map_err(CliError::from)
        }
    };
    bot.shutdown().await;
    result
}

/// The commands every `mino run` bot answers.
pub fn builtin_dispatcher() -> Result<Dispatcher, CoreError> {
    let mut dispatcher = Dispatcher::new();

    dispatcher.command(
        Command::new("ping")
            .description("Check that the bot is alive and show the API latency.")
            .cooldown(Duration::from_secs(5)),
        ping,
    )?;
    dispatcher.command(
        Command::new("echo")
            .alias("say")
            .description("Repeat the given text.")
            .usage("echo <text>"),
        echo,
    )?;
    dispatcher.command(
        Command::new("whoami").description("Show what the bot knows about you."),
        whoami,
    )?;

    dispatcher.on(EventName::MemberJoin, welcome)?;
    dispatcher.on_error(|err| async move {
        warn!(error = %err, "handler failed");
        Ok(())
    });

    Ok(dispatcher)
}

async fn ping(ctx: Context) -> Result<(), CoreError> {
    let millis = ctx.client().ping().await?;
    ctx.reply(format!("Pong! {millis:.0} ms")).await?;
    Ok(())
}

async fn echo(ctx: Context) -> Result<(), CoreError> {
    if ctx.args().is_empty() {
        return Ok(());
    }
    ctx.send(ctx.args().to_owned()).await?;
    Ok(())
}

async fn whoami(ctx: Context) -> Result<(), CoreError> {
    let reply = format!(
        "[c]{}\n[c]uid: {}\n[c]community: {}",
        ctx.username(),
        ctx.user_id(),
        ctx.com_id()
    );
    ctx.reply(reply).await?;
    Ok(())
}

async fn welcome(ctx: Context) -> Result<(), CoreError> {
    let mention = mino_core::prepare_mentions([ctx.username()]);
    let name = mention.first().map_or("", String::as_str);
    ctx.send(format!("Welcome, {name}!")).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_commands_register() {
        let dispatcher = builtin_dispatcher().unwrap();
        let names: Vec<_> = dispatcher.commands().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"ping"));
        assert!(names.contains(&"echo"));
        assert!(dispatcher.has_handler(EventName::MemberJoin));
        assert!(dispatcher.help_text().contains("[i]Usage: echo <text>"));
    }
}
