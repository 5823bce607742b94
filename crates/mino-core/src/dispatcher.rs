// ── Command & event dispatcher ──
//
// Owns every registered handler and routes classified stream events to
// them. Text messages go through command resolution, cooldowns, and
// the built-in help reply; other chat events go straight to their
// handler with a `Context`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use mino_api::{AminoClient, EventName, InboundEvent, Message, Notification, OnlineMembers};

use crate::command::{Command, CommandTable, CooldownMap, cooldown_reply};
use crate::config::{DEFAULT_PREFIX, validate_prefix};
use crate::context::{Context, Runtime};
use crate::error::CoreError;

/// Boxed future returned by every handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), CoreError>> + Send>>;

type ContextHandler = Arc<dyn Fn(Context) -> HandlerFuture + Send + Sync>;
type NotificationHandler = Arc<dyn Fn(Notification) -> HandlerFuture + Send + Sync>;
type PresenceHandler = Arc<dyn Fn(OnlineMembers) -> HandlerFuture + Send + Sync>;
type ReadyHandler = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(CoreError) -> HandlerFuture + Send + Sync>;
type TaskHandler = Arc<dyn Fn(AminoClient) -> HandlerFuture + Send + Sync>;

// ── Outcome ──────────────────────────────────────────────────────────

/// What [`Dispatcher::dispatch`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A command handler ran.
    Command(String),
    /// The command was rejected because the user is cooling down.
    Cooldown { command: String, remaining: Duration },
    /// The built-in help text was sent.
    Help,
    /// An event handler ran.
    Event(EventName),
    /// Nothing was registered for this event.
    Ignored,
}

/// A routed event whose handler has not run yet.
#[must_use = "the handler only runs when the routed event is run"]
pub struct Routed {
    outcome: Outcome,
    work: Option<HandlerFuture>,
}

impl Routed {
    fn idle(outcome: Outcome) -> Self {
        Self { outcome, work: None }
    }

    fn with(outcome: Outcome, work: HandlerFuture) -> Self {
        Self {
            outcome,
            work: Some(work),
        }
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Whether there is a handler left to run.
    pub fn has_work(&self) -> bool {
        self.work.is_some()
    }

    /// Run the handler, reporting its failure through `dispatcher`.
    pub async fn run(self, dispatcher: &Dispatcher) -> Outcome {
        if let Some(work) = self.work {
            dispatcher.run(work).await;
        }
        self.outcome
    }
}

impl std::fmt::Debug for Routed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Routed")
            .field("outcome", &self.outcome)
            .field("has_work", &self.has_work())
            .finish()
    }
}

/// A periodic background job.
#[derive(Clone)]
pub struct Task {
    pub interval: Duration,
    handler: TaskHandler,
}

impl Task {
    pub(crate) fn run(&self, client: AminoClient) -> HandlerFuture {
        (self.handler)(client)
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

/// Registry of command and event handlers.
///
/// Built up front, then shared read-only behind an `Arc` by the bot.
pub struct Dispatcher {
    prefix: String,
    commands: CommandTable<ContextHandler>,
    events: HashMap<EventName, ContextHandler>,
    notifications: HashMap<EventName, NotificationHandler>,
    user_online: Option<PresenceHandler>,
    ready: Option<ReadyHandler>,
    error: Option<ErrorHandler>,
    tasks: Vec<Task>,
    cooldowns: CooldownMap,
    cooldown_message: Option<String>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.into(),
            commands: CommandTable::new(),
            events: HashMap::new(),
            notifications: HashMap::new(),
            user_online: None,
            ready: None,
            error: None,
            tasks: Vec::new(),
            cooldowns: CooldownMap::default(),
            cooldown_message: None,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn set_prefix(&mut self, prefix: &str) -> Result<(), CoreError> {
        validate_prefix(prefix)?;
        self.prefix = prefix.to_owned();
        Ok(())
    }

    /// Override the cooldown reply. `{seconds}` is replaced with the
    /// remaining whole seconds.
    pub fn set_cooldown_message(&mut self, template: impl Into<String>) {
        self.cooldown_message = Some(template.into());
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register a command. Names and aliases must be unique.
    pub fn command<F, Fut>(&mut self, command: Command, handler: F) -> Result<(), CoreError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        debug!(command = %command.name, aliases = ?command.aliases, "registering command");
        self.commands
            .register(command, Arc::new(move |ctx| Box::pin(handler(ctx))))
    }

    /// Register a handler for a chat event such as `text_message` or
    /// `member_join`.
    pub fn on<F, Fut>(&mut self, event: EventName, handler: F) -> Result<(), CoreError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        if !event.is_chat() {
            return Err(CoreError::WrongEventKind {
                event: event.to_string(),
                handler: "chat",
            });
        }
        insert_unique(&mut self.events, event, Arc::new(move |ctx| Box::pin(handler(ctx))))
    }

    /// Register a handler for a push notification event. It receives
    /// the raw notification.
    pub fn on_notification<F, Fut>(&mut self, event: EventName, handler: F) -> Result<(), CoreError>
    where
        F: Fn(Notification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        if !event.is_notification() {
            return Err(CoreError::WrongEventKind {
                event: event.to_string(),
                handler: "notification",
            });
        }
        insert_unique(
            &mut self.notifications,
            event,
            Arc::new(move |notification| Box::pin(handler(notification))),
        )
    }

    pub fn on_user_online<F, Fut>(&mut self, handler: F)
    where
        F: Fn(OnlineMembers) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.user_online = Some(Arc::new(move |members| Box::pin(handler(members))));
    }

    /// Runs once the event stream first connects.
    pub fn on_ready<F, Fut>(&mut self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.ready = Some(Arc::new(move || Box::pin(handler())));
    }

    /// Receives every error returned by another handler.
    pub fn on_error<F, Fut>(&mut self, handler: F)
    where
        F: Fn(CoreError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.error = Some(Arc::new(move |err| Box::pin(handler(err))));
    }

    /// Run `handler` every `interval` for as long as the bot is connected.
    /// Failures are logged and the task keeps running.
    pub fn task<F, Fut>(&mut self, interval: Duration, handler: F)
    where
        F: Fn(AminoClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.tasks.push(Task {
            interval,
            handler: Arc::new(move |client| Box::pin(handler(client))),
        });
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.commands()
    }

    pub fn help_text(&self) -> String {
        self.commands.help_text()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn has_handler(&self, event: EventName) -> bool {
        match event {
            EventName::UserOnline => self.user_online.is_some(),
            event if event.is_notification() => self.notifications.contains_key(&event),
            event => self.events.contains_key(&event),
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Route one classified event and run its handler. Handler errors go
    /// to the error handler, or are logged when there is none.
    pub async fn dispatch(&self, runtime: &Runtime, event: &InboundEvent) -> Outcome {
        self.route(runtime, event).run(self).await
    }

    /// Decide what an event does without running any handler.
    ///
    /// Command resolution, cooldown arming, and the mailbox write all
    /// happen here, so calling this in receipt order keeps them in
    /// receipt order. The returned [`Routed`] carries the handler work.
    pub fn route(&self, runtime: &Runtime, event: &InboundEvent) -> Routed {
        match event {
            InboundEvent::Chat {
                name: EventName::TextMessage,
                message,
            } => self.route_text(runtime, message),
            InboundEvent::Chat { name, message } => {
                let Some(handler) = self.events.get(name) else {
                    return Routed::idle(Outcome::Ignored);
                };
                let ctx = Context::new(runtime.clone(), Arc::new(message.clone()), *name);
                Routed::with(Outcome::Event(*name), handler(ctx))
            }
            InboundEvent::Notification { name, notification } => {
                let Some(handler) = self.notifications.get(name) else {
                    return Routed::idle(Outcome::Ignored);
                };
                Routed::with(Outcome::Event(*name), handler(notification.clone()))
            }
            InboundEvent::UserOnline(members) => {
                let Some(ref handler) = self.user_online else {
                    return Routed::idle(Outcome::Ignored);
                };
                Routed::with(Outcome::Event(EventName::UserOnline), handler(members.clone()))
            }
            InboundEvent::Channel(_) => Routed::idle(Outcome::Ignored),
        }
    }

    fn route_text(&self, runtime: &Runtime, message: &Message) -> Routed {
        let content = message.content();
        let invocation = content.strip_prefix(self.prefix.as_str()).map(|rest| {
            let (token, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            (token, args.trim_start())
        });
        let resolved = invocation.and_then(|(token, args)| {
            self.commands
                .resolve(token)
                .map(|(command, handler)| (command, handler, args))
        });

        if resolved.is_none() && runtime.intents() {
            runtime
                .mailbox()
                .put(message.chat_id(), message.author_id(), content);
        }

        let ctx = Context::new(
            runtime.clone(),
            Arc::new(message.clone()),
            EventName::TextMessage,
        );

        let Some((token, _)) = invocation else {
            let Some(handler) = self.events.get(&EventName::TextMessage) else {
                return Routed::idle(Outcome::Ignored);
            };
            return Routed::with(Outcome::Event(EventName::TextMessage), handler(ctx));
        };

        let Some((command, handler, args)) = resolved else {
            if token == "help" {
                return Routed::with(Outcome::Help, reply(ctx, self.help_text()));
            }
            return Routed::idle(Outcome::Ignored);
        };

        if let Err(remaining) =
            self.cooldowns
                .try_acquire(&command.name, message.author_id(), command.cooldown)
        {
            debug!(command = %command.name, user = message.author_id(), ?remaining, "on cooldown");
            let text = cooldown_reply(self.cooldown_message.as_deref(), remaining);
            return Routed::with(
                Outcome::Cooldown {
                    command: command.name.clone(),
                    remaining,
                },
                reply(ctx, text),
            );
        }

        debug!(command = %command.name, user = message.author_id(), "invoking command");
        Routed::with(
            Outcome::Command(command.name.clone()),
            handler(ctx.with_command(&command.name, args)),
        )
    }

    /// Run the ready handler. Returns `false` when none is registered.
    pub(crate) async fn emit_ready(&self) -> bool {
        let Some(ref handler) = self.ready else {
            return false;
        };
        self.run(handler()).await;
        true
    }

    /// Forget cooldowns that have already expired.
    pub(crate) fn purge_cooldowns(&self) {
        self.cooldowns.purge_expired();
    }

    async fn run(&self, future: HandlerFuture) {
        if let Err(e) = future.await {
            self.report(e).await;
        }
    }

    pub(crate) async fn report(&self, err: CoreError) {
        let Some(ref handler) = self.error else {
            warn!(error = %err, "handler failed");
            return;
        };
        if let Err(e) = handler(err).await {
            warn!(error = %e, "error handler failed");
        }
    }
}

fn reply(ctx: Context, text: String) -> HandlerFuture {
    Box::pin(async move { ctx.reply(text).await.map(|_| ()) })
}

fn insert_unique<H>(
    table: &mut HashMap<EventName, H>,
    event: EventName,
    handler: H,
) -> Result<(), CoreError> {
    if table.contains_key(&event) {
        return Err(CoreError::DuplicateHandler {
            event: event.to_string(),
        });
    }
    table.insert(event, handler);
    Ok(())
}
