// ── Bot lifecycle ──
//
// Ties the HTTP client, the event stream, and the dispatcher together:
// login (with the credential cache and session recovery), the stream
// reader, registered background tasks, and the activity loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mino_api::{
    Account, AminoClient, ConnectionState, CredentialCache, InboundEvent, PasswordLogin, Session,
    StreamManager,
};

use crate::config::{BotConfig, parse_community_id};
use crate::context::Runtime;
use crate::dispatcher::{Dispatcher, Task};
use crate::error::CoreError;
use crate::mailbox::Mailbox;

const NO_COMMUNITY: i64 = 0;
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);
const HANDLER_GRACE_PERIOD: Duration = Duration::from_secs(5);

// ── LoginRequest ─────────────────────────────────────────────────────

/// Credentials for [`Bot::login`]. Either a session id or an email and
/// password must be present.
#[derive(Debug, Clone, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<SecretString>,
    pub sid: Option<SecretString>,
    pub device_id: Option<String>,
    /// Reuse a cached session for this email when one exists.
    pub use_cache: bool,
}

impl LoginRequest {
    pub fn password(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password),
            use_cache: true,
            ..Self::default()
        }
    }

    pub fn sid(sid: SecretString) -> Self {
        Self {
            sid: Some(sid),
            ..Self::default()
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

// ── Bot ──────────────────────────────────────────────────────────────

/// A logged-in account wired to a dispatcher.
///
/// Cheaply cloneable via `Arc<BotInner>`. Call [`login`](Self::login),
/// then [`connect`](Self::connect) to start the event stream and the
/// background tasks, and [`shutdown`](Self::shutdown) to stop them.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

struct BotInner {
    config: BotConfig,
    client: AminoClient,
    stream: StreamManager,
    dispatcher: Arc<Dispatcher>,
    mailbox: Arc<Mailbox>,
    cache: Option<Arc<CredentialCache>>,
    community_id: AtomicI64,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Bot {
    /// Build a bot. Does not touch the network.
    pub fn new(config: BotConfig, dispatcher: Dispatcher) -> Result<Self, CoreError> {
        let client = AminoClient::new(config.client.clone())?;
        Self::with_client(config, client, dispatcher)
    }

    /// Build a bot around an existing client.
    pub fn with_client(
        config: BotConfig,
        client: AminoClient,
        mut dispatcher: Dispatcher,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        dispatcher.set_prefix(&config.command_prefix)?;
        if let Some(ref template) = config.cooldown_message {
            dispatcher.set_cooldown_message(template.clone());
        }

        let stream = StreamManager::new(client.clone(), config.stream.clone());
        let cache = config
            .cache_dir
            .as_deref()
            .map(|dir| Arc::new(CredentialCache::in_dir(dir)));
        let community_id = AtomicI64::new(config.community_id.unwrap_or(NO_COMMUNITY));

        Ok(Self {
            inner: Arc::new(BotInner {
                config,
                client,
                stream,
                dispatcher: Arc::new(dispatcher),
                mailbox: Arc::new(Mailbox::default()),
                cache,
                community_id,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.inner.config
    }

    pub fn client(&self) -> &AminoClient {
        &self.inner.client
    }

    pub fn stream(&self) -> &StreamManager {
        &self.inner.stream
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    /// Handles shared with every handler context.
    pub fn runtime(&self) -> Runtime {
        Runtime::new(self.inner.client.clone())
            .with_stream(self.inner.stream.clone())
            .with_mailbox(Arc::clone(&self.inner.mailbox))
            .with_intents(self.inner.config.intents)
    }

    // ── Authentication ───────────────────────────────────────────────

    /// Log in and install session recovery.
    ///
    /// A session id wins over email and password. With `use_cache`, a
    /// cached session for the email is tried first and a password login
    /// only happens when the service rejects it.
    pub async fn login(&self, request: LoginRequest) -> Result<Account, CoreError> {
        let client = &self.inner.client;

        if let Some(sid) = request.sid {
            if let Some(ref device_id) = request.device_id {
                client.set_device_id(device_id.clone());
            }
            return client
                .login_with_sid(sid)
                .await
                .map_err(CoreError::from_login);
        }

        let (Some(email), Some(password)) = (request.email, request.password) else {
            return Err(CoreError::MissingCredentials);
        };

        let mut device_id = request.device_id;
        if request.use_cache {
            if let Some(cache) = self.inner.cache.as_deref() {
                if let Some(account) = self.resume_cached(cache, &email, &mut device_id).await? {
                    self.install_recovery(&email, password);
                    return Ok(account);
                }
            }
        }

        let response = client
            .authenticate(&email, &password, device_id.as_deref())
            .await
            .map_err(CoreError::from_login)?;

        if let Some(ref cache) = self.inner.cache {
            cache.cache_login(
                &email,
                &client.device_id(),
                &SecretString::from(response.sid),
            )?;
        }
        self.install_recovery(&email, password);

        let account = client.fetch_account().await?;
        info!(
            user_id = %account.profile.uid,
            nickname = account.profile.nickname.as_deref().unwrap_or_default(),
            "logged in"
        );
        Ok(account)
    }

    /// Try the cached session for `email`. `Ok(None)` means a password
    /// login is needed; the cached device id is handed back through
    /// `device_id` unless one was given explicitly.
    async fn resume_cached(
        &self,
        cache: &CredentialCache,
        email: &str,
        device_id: &mut Option<String>,
    ) -> Result<Option<Account>, CoreError> {
        let Some(cached) = cache.fetch_cache(email)? else {
            debug!(email, "no cached session");
            return Ok(None);
        };
        device_id.get_or_insert(cached.device_id);

        let session = match Session::from_sid(cached.sid) {
            Ok(session) => session,
            Err(e) => {
                warn!(email, error = %e, "cached session id is unusable");
                return Ok(None);
            }
        };

        let client = &self.inner.client;
        if let Some(ref device_id) = *device_id {
            client.set_device_id(device_id.clone());
        }
        client.install_session(session);

        match client.probe_session().await {
            Ok(account) => {
                info!(email, user_id = %account.profile.uid, "resumed cached session");
                Ok(Some(account))
            }
            Err(e) => {
                debug!(email, error = %e, "cached session rejected");
                client.clear_session();
                Ok(None)
            }
        }
    }

    fn install_recovery(&self, email: &str, password: SecretString) {
        let mut provider = PasswordLogin::new(email, password);
        if let Some(ref cache) = self.inner.cache {
            provider = provider.with_cache(Arc::clone(cache));
        }
        self.inner.client.set_credential_provider(Arc::new(provider));
    }

    /// Drop the session and the recovery credentials.
    pub fn logout(&self) {
        self.inner.client.logout();
    }

    pub async fn ping(&self) -> Result<f64, CoreError> {
        self.inner
            .client
            .ping()
            .await
            .map_err(|e| CoreError::PingFailed {
                reason: e.to_string(),
            })
    }

    // ── Community ────────────────────────────────────────────────────

    /// Set the working community from its textual id.
    pub fn set_community_id(&self, raw: &str) -> Result<i64, CoreError> {
        let id = parse_community_id(raw)?;
        self.inner.community_id.store(id, Ordering::Relaxed);
        Ok(id)
    }

    pub fn community_id(&self) -> Result<i64, CoreError> {
        match self.inner.community_id.load(Ordering::Relaxed) {
            NO_COMMUNITY => Err(CoreError::MissingCommunityId),
            id => Ok(id),
        }
    }

    /// Resolve a community link and make it the working community.
    pub async fn fetch_community_id(&self, link: &str) -> Result<i64, CoreError> {
        let id = self.inner.client.fetch_community_id(link).await?;
        self.inner.community_id.store(id, Ordering::Relaxed);
        Ok(id)
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open the event stream and spawn the reader, registered tasks,
    /// and (when enabled) the activity loop.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if !self.inner.client.is_authenticated() {
            return Err(CoreError::NotLoggedIn);
        }

        let events = self.inner.stream.subscribe();
        let state = self.inner.stream.state();
        self.inner.stream.start()?;

        let mut handles = self.inner.task_handles.lock().await;
        let cancel = self.inner.cancel.clone();

        handles.push(tokio::spawn(reader_task(self.clone(), events, cancel.clone())));
        handles.push(tokio::spawn(ready_task(self.clone(), state, cancel.clone())));
        handles.push(tokio::spawn(housekeeping_task(self.clone(), cancel.clone())));

        for task in self.inner.dispatcher.tasks() {
            handles.push(tokio::spawn(user_task(
                self.inner.client.clone(),
                task.clone(),
                cancel.clone(),
            )));
        }

        if self.inner.config.online_status {
            handles.push(tokio::spawn(activity_task(self.clone(), cancel)));
        }

        debug!(tasks = handles.len(), "bot connected");
        Ok(())
    }

    /// Connect and run until [`shutdown`](Self::shutdown) is called.
    ///
    /// Fails if the event stream closes on its own, e.g. once it runs
    /// out of reconnection attempts.
    pub async fn run(&self) -> Result<(), CoreError> {
        let mut state = self.inner.stream.state();
        self.connect().await?;

        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => Ok(()),
            _ = async { state.wait_for(|s| *s == ConnectionState::Closed).await.is_ok() } => {
                if self.is_cancelled() {
                    return Ok(());
                }
                warn!("event stream closed, stopping");
                Err(CoreError::ConnectionFailed {
                    reason: "event stream closed".into(),
                })
            }
        }
    }

    /// Stop the stream and every background task, then wait for them.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.stream.shutdown().await;

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("bot stopped");
    }

    fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Read classified events and route each one in receipt order. Only
/// the handler futures run on their own tasks, so a slow handler never
/// stalls the reader. On cancel, in-flight handlers get a grace period
/// and are then aborted.
async fn reader_task(
    bot: Bot,
    events: broadcast::Receiver<Arc<InboundEvent>>,
    cancel: CancellationToken,
) {
    let runtime = bot.runtime();
    let dispatcher = Arc::clone(&bot.inner.dispatcher);
    let mut events = BroadcastStream::new(events);
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(done) = handlers.join_next(), if !handlers.is_empty() => {
                if let Some(e) = done.err().filter(JoinError::is_panic) {
                    warn!(error = %e, "handler panicked");
                }
            }
            next = events.next() => match next {
                Some(Ok(event)) => {
                    let routed = dispatcher.route(&runtime, &event);
                    if routed.has_work() {
                        let dispatcher = Arc::clone(&dispatcher);
                        handlers.spawn(async move {
                            routed.run(&dispatcher).await;
                        });
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(skipped, "event reader lagged, events dropped");
                }
                None => break,
            }
        }
    }

    drain_handlers(&mut handlers).await;
}

/// Wait for in-flight handlers, aborting whatever outlives the grace period.
async fn drain_handlers(handlers: &mut JoinSet<()>) {
    if handlers.is_empty() {
        return;
    }
    debug!(in_flight = handlers.len(), "waiting for handlers");
    let drained = tokio::time::timeout(HANDLER_GRACE_PERIOD, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(aborted = handlers.len(), "handlers still running at shutdown, aborting");
        handlers.shutdown().await;
    }
}

/// Fire the ready handler once the stream first connects.
async fn ready_task(
    bot: Bot,
    mut state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        ok = async { state.wait_for(|s| *s == ConnectionState::Connected).await.is_ok() } => ok,
    };
    if !connected {
        return;
    }

    if !bot.inner.dispatcher.emit_ready().await {
        let nickname = bot
            .inner
            .client
            .account()
            .and_then(|account| account.profile.nickname)
            .unwrap_or_default();
        info!(user_id = ?bot.inner.client.user_id(), "Logged in as {nickname}");
    }
}

/// Drop expired cooldowns and mailbox slots.
async fn housekeeping_task(bot: Bot, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                bot.inner.dispatcher.purge_cooldowns();
                bot.inner.mailbox.purge_expired();
            }
        }
    }
}

/// Run a registered task on its interval, surviving its own failures.
async fn user_task(client: AminoClient, task: Task, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(task.interval);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = task.run(client.clone()).await {
                    warn!(error = %e, "background task failed");
                }
            }
        }
    }
}

/// Report active time for every community the bot has heard from.
/// Stops for good after the first failure.
async fn activity_task(bot: Bot, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(bot.inner.config.activity_interval);
    let timezone = bot.inner.config.timezone;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let mut communities = bot.inner.stream.communities();
                if let Ok(id) = bot.community_id() {
                    if !communities.contains(&id) {
                        communities.push(id);
                    }
                }
                for com_id in communities {
                    if bot.is_cancelled() {
                        return;
                    }
                    if let Err(e) = bot.inner.client.send_active_time(com_id, timezone).await {
                        warn!(com_id, error = %e, "active time report failed, disabling online status");
                        return;
                    }
                    debug!(com_id, "active time reported");
                }
            }
        }
    }
}
