//! BLE connection management.
//!
//! Handles connecting to heaters with a bounded retry policy and watching for
//! disconnects the caller did not ask for.

use btleplug::api::{Central, CentralEvent, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Connection state for a heater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected to the heater.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected to the heater.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// The identifier of the peripheral.
    pub identifier: String,
    /// The new connection state.
    pub state: ConnectionState,
    /// Whether the change was requested through [`ConnectionManager::disconnect`].
    pub expected: bool,
}

/// How hard to try when establishing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of connection attempts before giving up.
    pub max_attempts: u32,
    /// Upper bound on a single attempt, including service discovery.
    pub attempt_timeout: Duration,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    ///
    /// Doubles from `initial_delay` and is capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            attempt_timeout: Duration::from_secs(30),
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

/// Run `attempt` until it succeeds or the policy is exhausted.
///
/// Each attempt is bounded by `attempt_timeout`. After every failed attempt
/// `teardown` runs, then the back-off delay is slept unless it was the last one.
pub async fn connect_with_retry<A, AF, T, TF>(
    policy: &RetryPolicy,
    mut attempt: A,
    mut teardown: T,
) -> Result<()>
where
    A: FnMut(u32) -> AF,
    AF: Future<Output = Result<()>>,
    T: FnMut() -> TF,
    TF: Future<Output = ()>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_failure = String::new();

    for n in 1..=max_attempts {
        debug!("Connection attempt {} of {}", n, max_attempts);

        match tokio::time::timeout(policy.attempt_timeout, attempt(n)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => {
                warn!("Connection attempt {} failed: {}", n, e);
                last_failure = e.to_string();
            }
            Err(_) => {
                warn!(
                    "Connection attempt {} timed out after {:?}",
                    n, policy.attempt_timeout
                );
                last_failure = format!("timed out after {:?}", policy.attempt_timeout);
            }
        }

        // Leave no half-open link behind before the next attempt.
        teardown().await;

        if n < max_attempts {
            tokio::time::sleep(policy.delay_after(n)).await;
        }
    }

    Err(Error::ConnectionFailed {
        reason: format!("Failed after {} attempts: {}", max_attempts, last_failure),
    })
}

/// Shared connection state plus its event channel.
#[derive(Clone)]
pub struct ConnectionStatus {
    identifier: String,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionStatus {
    /// Create a status cell for the named peripheral, starting disconnected.
    pub fn new(identifier: String) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            identifier,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            event_tx,
        }
    }

    /// Get the current state.
    pub fn get(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Update the state and emit an event if it changed.
    pub fn set(&self, new_state: ConnectionState, expected: bool) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
            self.emit(new_state, expected);
        }
    }

    /// Record a disconnect reported by the adapter.
    ///
    /// Only an established (or closing) link can be lost; while connecting,
    /// `connect()` owns the state and the event is ignored. Returns the emitted
    /// event, if any.
    pub fn mark_lost(&self, expected: bool) -> Option<ConnectionEvent> {
        let was_up = {
            let mut state = self.state.write();
            match *state {
                ConnectionState::Connected | ConnectionState::Disconnecting => {
                    *state = ConnectionState::Disconnected;
                    true
                }
                _ => false,
            }
        };

        if !was_up {
            debug!(
                "Ignoring disconnect event for {} while not connected",
                self.identifier
            );
            return None;
        }

        if expected {
            debug!("Heater {} disconnected", self.identifier);
        } else {
            warn!("Unexpected disconnect from heater {}", self.identifier);
        }

        Some(self.emit(ConnectionState::Disconnected, expected))
    }

    fn emit(&self, state: ConnectionState, expected: bool) -> ConnectionEvent {
        let event = ConnectionEvent {
            identifier: self.identifier.clone(),
            state,
            expected,
        };
        let _ = self.event_tx.send(event.clone());
        event
    }
}

/// Resets a `Connecting` state if the connect future is dropped before finishing.
struct ConnectingGuard<'a> {
    status: &'a ConnectionStatus,
    finished: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn new(status: &'a ConnectionStatus) -> Self {
        status.set(ConnectionState::Connecting, false);
        Self {
            status,
            finished: false,
        }
    }

    fn finish(mut self, state: ConnectionState) {
        self.finished = true;
        self.status.set(state, false);
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Connect cancelled; resetting state");
            self.status.set(ConnectionState::Disconnected, false);
        }
    }
}

/// Manages the connection to one heater.
pub struct ConnectionManager {
    /// Adapter the peripheral belongs to; source of disconnect events.
    adapter: Adapter,
    /// The peripheral to manage.
    peripheral: Peripheral,
    /// Current connection state and its event channel.
    status: ConnectionStatus,
    /// Set while a caller-requested disconnect is in progress.
    disconnect_requested: Arc<AtomicBool>,
    /// Retry policy for connect.
    policy: RetryPolicy,
    /// Handle to the disconnect monitor task.
    monitor_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a new connection manager for a peripheral.
    pub fn new(adapter: Adapter, peripheral: Peripheral, policy: RetryPolicy) -> Self {
        let status = ConnectionStatus::new(peripheral.address().to_string());

        Self {
            adapter,
            peripheral,
            status,
            disconnect_requested: Arc::new(AtomicBool::new(false)),
            policy,
            monitor_handle: RwLock::new(None),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.status.get()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.status.subscribe()
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Get the retry policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Connect to the heater, retrying according to the policy.
    ///
    /// Cancel-safe: dropping the future mid-connect returns the state to
    /// `Disconnected`.
    pub async fn connect(&self) -> Result<()> {
        let current_state = self.state();

        if current_state.is_connected() {
            debug!("Already connected");
            return Ok(());
        }

        if current_state.is_transitioning() {
            return Err(Error::ConnectionFailed {
                reason: "Connection already in progress".to_string(),
            });
        }

        self.disconnect_requested.store(false, Ordering::SeqCst);
        let guard = ConnectingGuard::new(&self.status);
        self.start_monitor();

        // Check if already connected at BLE level
        if self.peripheral.is_connected().await.unwrap_or(false) {
            info!("Peripheral already connected at BLE level");
            match self
                .bounded("service discovery", self.peripheral.discover_services())
                .await
            {
                Ok(()) => {
                    guard.finish(ConnectionState::Connected);
                    return Ok(());
                }
                Err(e) => {
                    warn!("Service discovery on existing link failed: {}", e);
                    self.teardown().await;
                }
            }
        }

        match connect_with_retry(&self.policy, |_| self.try_connect(), || self.teardown()).await {
            Ok(()) => {
                info!("Successfully connected to heater");
                guard.finish(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                guard.finish(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn try_connect(&self) -> Result<()> {
        self.peripheral.connect().await?;
        self.peripheral.discover_services().await?;
        Ok(())
    }

    async fn teardown(&self) {
        if let Err(e) = self.bounded("disconnect", self.peripheral.disconnect()).await {
            debug!("Teardown after failed attempt: {}", e);
        }
    }

    /// Bound a btleplug call by the per-attempt timeout.
    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = btleplug::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.policy.attempt_timeout, fut).await {
            Ok(result) => result.map_err(Error::Bluetooth),
            Err(_) => Err(Error::Timeout {
                operation: operation.to_string(),
            }),
        }
    }

    /// Disconnect from the heater.
    ///
    /// Also closes a BLE link that is up while our state says otherwise.
    pub async fn disconnect(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Disconnecting => return Ok(()),
            ConnectionState::Disconnected => {
                if !self.peripheral.is_connected().await.unwrap_or(false) {
                    return Ok(());
                }
                debug!("Closing BLE link left open outside our state");
            }
            _ => {}
        }

        self.disconnect_requested.store(true, Ordering::SeqCst);
        self.status.set(ConnectionState::Disconnecting, true);

        let result = self.bounded("disconnect", self.peripheral.disconnect()).await;
        self.status.set(ConnectionState::Disconnected, true);

        match result {
            Ok(()) => {
                info!("Successfully disconnected from heater");
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                Err(e)
            }
        }
    }

    /// Check the link at the BLE level and fold the answer into our state.
    pub async fn refresh(&self) -> bool {
        let connected = self.peripheral.is_connected().await.unwrap_or(false);
        if !connected && self.is_connected() {
            debug!("Peripheral reports disconnected; updating state");
            self.status.set(ConnectionState::Disconnected, false);
        }
        connected && self.is_connected()
    }

    /// Start the background task that watches for disconnect events.
    fn start_monitor(&self) {
        let mut handle = self.monitor_handle.write();
        if handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }

        let adapter = self.adapter.clone();
        let peripheral_id = self.peripheral.id();
        let status = self.status.clone();
        let disconnect_requested = self.disconnect_requested.clone();

        *handle = Some(tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    return;
                }
            };

            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == peripheral_id {
                        status.mark_lost(disconnect_requested.load(Ordering::SeqCst));
                    }
                }
            }

            debug!("Disconnect monitor ended");
        }));
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor_handle.write().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            attempt_timeout: Duration::from_secs(5),
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());

        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Disconnecting.is_transitioning());
        assert!(!ConnectionState::Connected.is_transitioning());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Connected), "Connected");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = policy(10);

        assert_eq!(policy.delay_after(1), Duration::from_millis(250));
        assert_eq!(policy.delay_after(2), Duration::from_millis(500));
        assert_eq!(policy.delay_after(3), Duration::from_secs(1));
        assert_eq!(policy.delay_after(4), Duration::from_secs(2));
        assert_eq!(policy.delay_after(9), Duration::from_secs(2));
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 20);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let teardowns = AtomicU32::new(0);

        let result = connect_with_retry(
            &policy(4),
            |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(Error::ConnectionFailed {
                        reason: "le-connection-abort-by-local".to_string(),
                    })
                }
            },
            || {
                teardowns.fetch_add(1, Ordering::SeqCst);
                async {}
            },
        )
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(teardowns.load(Ordering::SeqCst), 4);
        match result {
            Err(Error::ConnectionFailed { reason }) => {
                assert!(reason.starts_with("Failed after 4 attempts"), "{}", reason);
                assert!(reason.contains("le-connection-abort-by-local"), "{}", reason);
            }
            other => panic!("expected connection failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_later_attempt() {
        let teardowns = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result = connect_with_retry(
            &policy(5),
            |n| async move {
                if n < 3 {
                    Err(Error::ConnectionLost)
                } else {
                    Ok(())
                }
            },
            || {
                teardowns.fetch_add(1, Ordering::SeqCst);
                async {}
            },
        )
        .await;

        assert!(result.is_ok());
        // One teardown per failed attempt, none after success.
        assert_eq!(teardowns.load(Ordering::SeqCst), 2);
        // Back-off of 250 ms then 500 ms.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(750), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(1), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_reports_timeout() {
        let result = connect_with_retry(
            &policy(2),
            |_| std::future::pending::<Result<()>>(),
            || async {},
        )
        .await;

        match result {
            Err(Error::ConnectionFailed { reason }) => {
                assert!(reason.contains("timed out after 5s"), "{}", reason);
            }
            other => panic!("expected connection failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unexpected_disconnect_marks_lost() {
        let status = ConnectionStatus::new("AA:BB:CC:DD:EE:FF".to_string());
        status.set(ConnectionState::Connected, false);
        let mut rx = status.subscribe();

        let event = status.mark_lost(false).expect("event for established link");
        assert_eq!(event.state, ConnectionState::Disconnected);
        assert!(!event.expected);
        assert_eq!(status.get(), ConnectionState::Disconnected);

        let received = rx.try_recv().unwrap();
        assert_eq!(received.state, ConnectionState::Disconnected);
        assert!(!received.expected);
        assert_eq!(received.identifier, "AA:BB:CC:DD:EE:FF");
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting_ignored() {
        let status = ConnectionStatus::new("AA:BB:CC:DD:EE:FF".to_string());
        status.set(ConnectionState::Connecting, false);
        let mut rx = status.subscribe();

        assert!(status.mark_lost(false).is_none());
        assert_eq!(status.get(), ConnectionState::Connecting);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_connect_resets_state() {
        let status = ConnectionStatus::new("AA:BB:CC:DD:EE:FF".to_string());

        let connecting = async {
            let _guard = ConnectingGuard::new(&status);
            std::future::pending::<()>().await;
        };
        let cancelled = tokio::time::timeout(Duration::from_secs(1), connecting).await;

        assert!(cancelled.is_err());
        assert_eq!(status.get(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_finished_guard_keeps_state() {
        let status = ConnectionStatus::new("AA:BB:CC:DD:EE:FF".to_string());

        let guard = ConnectingGuard::new(&status);
        assert_eq!(status.get(), ConnectionState::Connecting);
        guard.finish(ConnectionState::Connected);

        assert_eq!(status.get(), ConnectionState::Connected);
    }
}
