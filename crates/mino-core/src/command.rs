// ── Command table ──
//
// Registered commands keyed by name, with aliases resolving to their
// owner, plus the per-user cooldown map consulted before invocation.

use std::collections::HashMap;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::CoreError;

const HELP_HEADER: &str =
    "[bcu]Commands\n\n[ic]This is a list of all the commands available on this bot.\n";
const HELP_FOOTER: &str = "\n\n[ic]This message was generated automatically. If you have any questions, please contact the bot owner.";

// ── Command ──────────────────────────────────────────────────────────

/// Metadata for a chat command. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub aliases: Vec<String>,
    pub cooldown: Duration,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            usage: None,
            aliases: Vec::new(),
            cooldown: Duration::ZERO,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// The name and every alias.
    fn triggers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

// ── CommandTable ─────────────────────────────────────────────────────

/// Commands in registration order, each paired with its handler.
pub(crate) struct CommandTable<H> {
    entries: Vec<(Command, H)>,
    /// Name or alias -> index into `entries`.
    index: HashMap<String, usize>,
}

impl<H> CommandTable<H> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a command. Fails without modifying the table if its name or
    /// any alias is already taken, or repeats within the command itself.
    pub(crate) fn register(&mut self, command: Command, handler: H) -> Result<(), CoreError> {
        let mut seen = Vec::new();
        for trigger in command.triggers() {
            if trigger.is_empty() || trigger.chars().any(char::is_whitespace) {
                return Err(CoreError::InvalidCommandName {
                    name: trigger.to_owned(),
                });
            }
            if self.index.contains_key(trigger) || seen.contains(&trigger) {
                return Err(CoreError::DuplicateCommand {
                    name: trigger.to_owned(),
                });
            }
            seen.push(trigger);
        }

        let slot = self.entries.len();
        for trigger in command.triggers() {
            self.index.insert(trigger.to_owned(), slot);
        }
        self.entries.push((command, handler));
        Ok(())
    }

    /// Look up by exact name or alias.
    pub(crate) fn resolve(&self, token: &str) -> Option<(&Command, &H)> {
        self.index
            .get(token)
            .and_then(|slot| self.entries.get(*slot))
            .map(|(command, handler)| (command, handler))
    }

    pub(crate) fn contains(&self, token: &str) -> bool {
        self.index.contains_key(token)
    }

    pub(crate) fn commands(&self) -> impl Iterator<Item = &Command> {
        self.entries.iter().map(|(command, _)| command)
    }

    /// Auto-generated help listing. Commands without a description are
    /// left out.
    pub(crate) fn help_text(&self) -> String {
        let mut text = String::from(HELP_HEADER);
        for command in self.commands() {
            let Some(ref description) = command.description else {
                continue;
            };
            text.push_str(&format!("\n[uc]{}\n[ic]{description}", command.name));
            if let Some(ref usage) = command.usage {
                text.push_str(&format!("\n[i]Usage: {usage}"));
            }
        }
        text.push_str(HELP_FOOTER);
        text
    }
}

// ── Cooldowns ────────────────────────────────────────────────────────

/// `(command, user) -> expiry`.
#[derive(Debug, Default)]
pub(crate) struct CooldownMap {
    entries: DashMap<(String, String), Instant>,
}

impl CooldownMap {
    /// Check the cooldown and arm it when the command may run.
    ///
    /// Returns the remaining time when the user is still cooling down.
    /// The check and the update happen under one entry lock.
    pub(crate) fn try_acquire(
        &self,
        command: &str,
        user_id: &str,
        cooldown: Duration,
    ) -> Result<(), Duration> {
        if cooldown.is_zero() {
            return Ok(());
        }

        let now = Instant::now();
        let mut entry = self
            .entries
            .entry((command.to_owned(), user_id.to_owned()))
            .or_insert(now);

        if *entry > now {
            return Err(*entry - now);
        }
        *entry = now + cooldown;
        Ok(())
    }

    /// Drop entries whose cooldown has passed.
    pub(crate) fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, expiry| *expiry > now);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Render the cooldown reply. `{seconds}` in a custom template is
/// replaced with the whole seconds remaining.
pub(crate) fn cooldown_reply(template: Option<&str>, remaining: Duration) -> String {
    let seconds = remaining.as_secs();
    match template {
        Some(template) => template.replace("{seconds}", &seconds.to_string()),
        None => format!("You are on cooldown for {seconds} seconds."),
    }
}
