use std::{
    fmt,
    future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use shared::protocol::{ClientCommand, Frame};
use tokio::{
    sync::{mpsc, watch, Notify},
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    bus::FrameBus,
    transport::{Channel, Connector, WireMessage},
};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay after every close, retried forever.
    Fixed { delay: Duration },
    /// Doubling delay capped at `max`; gives up after `max_attempts`
    /// consecutive failed cycles when set.
    Exponential {
        initial: Duration,
        max: Duration,
        max_attempts: Option<u32>,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect number `attempt` (1-based, reset by every
    /// successful open), or `None` once the policy gives up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            ReconnectPolicy::Fixed { delay } => Some(delay),
            ReconnectPolicy::Exponential {
                initial,
                max,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|limit| attempt > limit) {
                    return None;
                }
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                Some(initial.saturating_mul(factor).min(max))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub url: Url,
    pub reconnect: ReconnectPolicy,
    pub heartbeat: Option<Duration>,
}

impl ConnectionOptions {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect: ReconnectPolicy::default(),
            heartbeat: None,
        }
    }
}

struct Shared {
    status: watch::Sender<ConnectionStatus>,
    outbound: Mutex<Option<mpsc::UnboundedSender<WireMessage>>>,
    torn_down: AtomicBool,
    /// Cuts a pending reconnect delay short.
    wake: Notify,
    bus: FrameBus,
}

impl Shared {
    fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn set_status(&self, next: ConnectionStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(status = %next, "live_client: connection status changed");
        }
    }

    fn install_outbound(&self, sender: Option<mpsc::UnboundedSender<WireMessage>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = sender;
    }

    fn send(&self, command: &ClientCommand) -> bool {
        if self.torn_down.load(Ordering::Acquire) {
            debug!("live_client: ignoring send after teardown");
            return false;
        }
        let status = self.status();
        if status != ConnectionStatus::Connected {
            warn!(%status, "live_client: dropping command while not connected");
            return false;
        }
        let text = match command.encode() {
            Ok(text) => text,
            Err(err) => {
                warn!(%err, "live_client: failed to encode command");
                return false;
            }
        };
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match outbound.as_ref() {
            Some(sender) if sender.send(WireMessage::Text(text)).is_ok() => true,
            _ => {
                warn!("live_client: channel went away before command could be queued");
                false
            }
        }
    }

    fn dispatch(&self, message: WireMessage) {
        let decoded = match &message {
            WireMessage::Text(text) => Frame::decode(text),
            WireMessage::Binary(bytes) => Frame::decode_bytes(bytes),
            WireMessage::Close => return,
        };
        match decoded {
            Ok(frame) => {
                self.bus.publish(&frame);
            }
            Err(err) => warn!(%err, "live_client: dropping undecodable frame"),
        }
    }
}

/// Cheap, cloneable handle for sending commands from any call site.
#[derive(Clone)]
pub struct Outbox {
    shared: Arc<Shared>,
}

impl Outbox {
    /// Queues `command` on the open channel. Returns `false` (and logs) when
    /// the connection is not open; never fails otherwise.
    pub fn send(&self, command: &ClientCommand) -> bool {
        self.shared.send(command)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }
}

/// Owns one persistent channel and the supervisor task that keeps it open.
pub struct ConnectionManager {
    options: ConnectionOptions,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(options: ConnectionOptions, connector: Arc<dyn Connector>, bus: FrameBus) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            options,
            connector,
            shared: Arc::new(Shared {
                status,
                outbound: Mutex::new(None),
                torn_down: AtomicBool::new(false),
                wake: Notify::new(),
                bus,
            }),
            shutdown,
            supervisor: Mutex::new(None),
        }
    }

    pub fn bus(&self) -> &FrameBus {
        &self.shared.bus
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn outbox(&self) -> Outbox {
        Outbox {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn send(&self, command: &ClientCommand) -> bool {
        self.shared.send(command)
    }

    /// Starts the supervisor unless one is already connecting or open. While
    /// the supervisor waits out a reconnect delay, retries immediately.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        if self.shared.torn_down.load(Ordering::Acquire) {
            warn!("live_client: connect called after teardown; ignoring");
            return;
        }
        let mut supervisor = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner);
        if supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
            match self.shared.status() {
                ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                    debug!("live_client: connect ignored; already connecting or open");
                }
                _ => {
                    debug!("live_client: connect skips the pending reconnect delay");
                    self.shared.wake.notify_one();
                }
            }
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("live_client: connect requires a tokio runtime");
            return;
        };
        self.shared.set_status(ConnectionStatus::Connecting);
        *supervisor = Some(runtime.spawn(supervise(
            Arc::clone(&self.connector),
            self.options.clone(),
            Arc::clone(&self.shared),
            self.shutdown.subscribe(),
        )));
    }

    /// Cancels any pending reconnect, closes an open channel and stops the
    /// supervisor. Permanent: later `connect`/`send` calls are no-ops.
    pub async fn shutdown(&self) {
        self.begin_teardown();
        let task = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut task) = task {
            if time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("live_client: supervisor did not stop in time; aborting");
                task.abort();
            }
        }
        self.shared.install_outbound(None);
        self.shared.set_status(ConnectionStatus::Disconnected);
        info!("live_client: connection torn down");
    }

    fn begin_teardown(&self) {
        if !self.shared.torn_down.swap(true, Ordering::AcqRel) {
            self.shutdown.send_replace(true);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.begin_teardown();
        let task = self
            .supervisor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelEnd {
    Closed,
    Shutdown,
}

async fn supervise(
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }
        shared.set_status(ConnectionStatus::Connecting);
        info!(url = %options.url, "live_client: connecting");
        let opened = tokio::select! {
            opened = connector.connect(&options.url) => opened,
            _ = shutdown.changed() => break,
        };
        match opened {
            Ok(channel) => {
                attempt = 0;
                if pump(channel, &shared, options.heartbeat, &mut shutdown).await
                    == ChannelEnd::Shutdown
                {
                    break;
                }
            }
            Err(err) => {
                warn!(%err, "live_client: connection attempt failed");
                shared.set_status(ConnectionStatus::Error);
            }
        }
        shared.set_status(ConnectionStatus::Disconnected);

        attempt = attempt.saturating_add(1);
        let Some(delay) = options.reconnect.delay_for(attempt) else {
            error!(attempt, "live_client: giving up on reconnecting");
            shared.set_status(ConnectionStatus::Error);
            return;
        };
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "live_client: reconnect scheduled"
        );
        tokio::select! {
            _ = time::sleep(delay) => {}
            _ = shared.wake.notified() => {
                debug!(attempt, "live_client: reconnecting early on request");
            }
            _ = shutdown.changed() => break,
        }
    }
    shared.install_outbound(None);
    shared.set_status(ConnectionStatus::Disconnected);
}

async fn pump(
    channel: Channel,
    shared: &Shared,
    heartbeat: Option<Duration>,
    shutdown: &mut watch::Receiver<bool>,
) -> ChannelEnd {
    let Channel {
        mut outbound,
        mut inbound,
    } = channel;
    let (sender, mut queued) = mpsc::unbounded_channel();
    shared.install_outbound(Some(sender));
    shared.set_status(ConnectionStatus::Connected);
    info!("live_client: connected");

    let mut heartbeat = heartbeat.map(|period| {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let end = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = outbound.send(WireMessage::Close).await;
                break ChannelEnd::Shutdown;
            }
            message = inbound.next() => match message {
                Some(Ok(WireMessage::Close)) | None => {
                    info!("live_client: channel closed by peer");
                    break ChannelEnd::Closed;
                }
                Some(Ok(message)) => shared.dispatch(message),
                Some(Err(err)) => {
                    warn!(%err, "live_client: channel failed");
                    break ChannelEnd::Closed;
                }
            },
            Some(message) = queued.recv() => {
                if let Err(err) = outbound.send(message).await {
                    warn!(%err, "live_client: send failed");
                    break ChannelEnd::Closed;
                }
            }
            _ = next_tick(&mut heartbeat) => {
                if let Ok(ping) = ClientCommand::Ping.encode() {
                    debug!("live_client: heartbeat");
                    if let Err(err) = outbound.send(WireMessage::Text(ping)).await {
                        warn!(%err, "live_client: heartbeat failed");
                        break ChannelEnd::Closed;
                    }
                }
            }
        }
    };
    shared.install_outbound(None);
    end
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
