//! Connection manager for the native peer.
//!
//! Owns the single native port. States move Disconnected -> Connecting ->
//! Connected; a disconnect drops the handle and re-enters Connecting without
//! caller involvement. The link mutex is held for the whole connect attempt,
//! so two attempts never overlap and at most one handle is ever live.

use crate::browser::{NativePort, NativeTransport, PortEvent, PortHandle};
use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, SendError};
use crate::types::{ping_record, ConnectionState};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, info, trace, warn};

/// Connection state owned exclusively by the manager
struct Link {
    /// Live transport handle, `None` unless Connected
    port: Option<Arc<dyn NativePort>>,
    /// Bumped on every successful connect; tags the event pump
    generation: u64,
    /// A reconnect loop is running
    reconnecting: bool,
}

struct Shared {
    config: ConnectionConfig,
    transport: Arc<dyn NativeTransport>,
    link: Mutex<Link>,
    state: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<ConnectionState>,
    inbound: mpsc::Sender<Value>,
    shutdown: AtomicBool,
}

/// Cloneable handle to the single native peer connection
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager; records received from the peer are sent to `inbound`
    pub fn new(
        config: ConnectionConfig,
        transport: Arc<dyn NativeTransport>,
        inbound: mpsc::Sender<Value>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(64);

        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                link: Mutex::new(Link {
                    port: None,
                    generation: 0,
                    reconnecting: false,
                }),
                state,
                transitions,
                inbound,
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    pub fn peer_name(&self) -> &str {
        &self.shared.config.peer_name
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that always holds the latest state
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Stream of every state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.shared.transitions.subscribe()
    }

    /// Connect unless a live connection already exists
    ///
    /// Concurrent callers wait for the attempt in flight instead of starting
    /// a second one.
    pub async fn ensure_connected(&self) -> Result<(), ConnectionError> {
        if self.is_shut_down() {
            return Err(ConnectionError::Shutdown);
        }

        let mut link = self.shared.link.lock().await;
        if link.port.is_some() {
            trace!("Already connected to {}", self.peer_name());
            return Ok(());
        }

        let result = self.connect_locked(&mut link).await;
        if result.is_err() && !self.is_shut_down() && !link.reconnecting {
            // Keep trying in the background; the caller still sees this failure
            link.reconnecting = true;
            self.spawn_reconnect();
        }
        result
    }

    /// Serialize `message` and hand it to the live port
    ///
    /// Resolves when the transport accepted the record, not when the peer
    /// processed it. No retry happens here; a rejected post reports the
    /// generation of the port that rejected it.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), SendError> {
        let value = serde_json::to_value(message)?;

        let (port, generation) = {
            let link = self.shared.link.lock().await;
            let port = link.port.clone().ok_or(SendError::NotConnected)?;
            (port, link.generation)
        };

        port.post(&value)
            .await
            .map_err(|source| SendError::Transport { generation, source })?;
        trace!("Posted record to {}", self.peer_name());
        Ok(())
    }

    /// Drop the port of `generation` after it rejected a post
    ///
    /// The browser reports the matching disconnect asynchronously; dropping
    /// the port here makes the next `ensure_connected` open a fresh one
    /// instead of reusing the dead handle. No-op when that port is already
    /// gone or was replaced.
    pub async fn discard_port(&self, generation: u64) {
        let mut link = self.shared.link.lock().await;
        if link.generation != generation || link.port.is_none() {
            trace!("Port generation {} already replaced", generation);
            return;
        }

        if let Some(port) = link.port.take() {
            port.disconnect();
        }
        self.set_state(ConnectionState::Disconnected);
        warn!(
            "Discarded port to {} after a rejected post (generation {})",
            self.peer_name(),
            generation
        );
    }

    /// Stop reconnecting and close the live port
    pub async fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);

        let mut link = self.shared.link.lock().await;
        if let Some(port) = link.port.take() {
            port.disconnect();
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Connection to {} shut down", self.peer_name());
    }

    fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.shared.state.send_replace(next);
        if previous != next {
            debug!("Connection state: {} -> {}", previous, next);
            let _ = self.shared.transitions.send(next);
        }
    }

    /// One connect attempt; the caller holds the link lock
    async fn connect_locked(&self, link: &mut Link) -> Result<(), ConnectionError> {
        let peer = self.shared.config.peer_name.clone();
        self.set_state(ConnectionState::Connecting);

        let PortHandle { port, events } = match self.shared.transport.connect(&peer).await {
            Ok(handle) => handle,
            Err(source) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(ConnectionError::Unreachable { peer, source });
            }
        };

        let port: Arc<dyn NativePort> = Arc::from(port);
        if let Err(source) = port.post(&ping_record()).await {
            port.disconnect();
            self.set_state(ConnectionState::Disconnected);
            return Err(ConnectionError::Handshake { peer, source });
        }

        link.generation += 1;
        link.port = Some(port);
        self.spawn_pump(link.generation, events);
        self.set_state(ConnectionState::Connected);
        info!("Connected to native peer {}", peer);
        Ok(())
    }

    fn spawn_reconnect(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.reconnect(false).await;
        });
    }

    fn spawn_pump(&self, generation: u64, events: mpsc::Receiver<PortEvent>) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.pump_events(generation, events).await;
        });
    }

    /// Forward peer records until the port reports a disconnect
    async fn pump_events(self, generation: u64, mut events: mpsc::Receiver<PortEvent>) {
        let reason = loop {
            match events.recv().await {
                Some(PortEvent::Message(message)) => {
                    debug!("Record from native peer: {}", message);
                    if self.shared.inbound.send(message).await.is_err() {
                        warn!("Inbound channel closed, dropping peer record");
                    }
                }
                Some(PortEvent::Disconnected { reason }) => break reason,
                None => break None,
            }
        };

        self.handle_disconnect(generation, reason).await;
    }

    async fn handle_disconnect(&self, generation: u64, reason: Option<String>) {
        {
            let mut link = self.shared.link.lock().await;

            // Notification from a handle that was already replaced or closed
            if link.generation != generation || link.port.is_none() {
                debug!("Ignoring stale disconnect (generation {})", generation);
                return;
            }

            if let Some(port) = link.port.take() {
                port.disconnect();
            }
            self.set_state(ConnectionState::Disconnected);
            warn!(
                "Native peer {} disconnected: {}",
                self.peer_name(),
                reason.as_deref().unwrap_or("no reason given")
            );

            if self.is_shut_down() || link.reconnecting {
                return;
            }
            link.reconnecting = true;
        }

        self.reconnect(true).await;
    }

    /// Retry until connected, with capped exponential backoff between attempts
    ///
    /// `immediate` skips the delay before the first attempt.
    async fn reconnect(&self, immediate: bool) {
        let max_backoff = self.shared.config.max_backoff();
        let mut backoff = self.shared.config.initial_backoff();
        let mut attempt: u32 = 0;
        let mut wait = !immediate;

        loop {
            if wait {
                debug!("Next reconnect attempt in {:?}", backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
            wait = true;
            attempt += 1;
            {
                let mut link = self.shared.link.lock().await;

                if self.is_shut_down() || link.port.is_some() {
                    link.reconnecting = false;
                    return;
                }

                match self.connect_locked(&mut link).await {
                    Ok(()) => {
                        link.reconnecting = false;
                        info!("Reconnected to {} after {} attempt(s)", self.peer_name(), attempt);
                        return;
                    }
                    Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeNetwork {
        failing_connects: StdMutex<u32>,
        connects: AtomicUsize,
        live: StdMutex<HashSet<usize>>,
        max_live: AtomicUsize,
        peers: StdMutex<HashMap<usize, mpsc::Sender<PortEvent>>>,
        posted: StdMutex<Vec<Value>>,
        reject_posts: AtomicBool,
    }

    impl FakeNetwork {
        fn fail_next_connects(&self, count: u32) {
            *self.failing_connects.lock().unwrap() = count;
        }

        fn live_count(&self) -> usize {
            self.live.lock().unwrap().len()
        }

        fn posted(&self) -> Vec<Value> {
            self.posted.lock().unwrap().clone()
        }

        /// Simulate the native host process going away
        async fn drop_peer(&self, id: usize) {
            self.live.lock().unwrap().remove(&id);
            let sender = self.peers.lock().unwrap().remove(&id).unwrap();
            sender
                .send(PortEvent::Disconnected {
                    reason: Some("Native host has exited.".to_string()),
                })
                .await
                .unwrap();
        }

        async fn push_from_peer(&self, id: usize, message: Value) {
            let sender = self.peers.lock().unwrap().get(&id).cloned().unwrap();
            sender.send(PortEvent::Message(message)).await.unwrap();
        }
    }

    struct FakeTransport(Arc<FakeNetwork>);

    struct FakePort {
        id: usize,
        net: Arc<FakeNetwork>,
    }

    #[async_trait]
    impl NativeTransport for FakeTransport {
        async fn connect(&self, peer_name: &str) -> Result<PortHandle, TransportError> {
            let net = &self.0;
            let id = net.connects.fetch_add(1, Ordering::SeqCst);
            {
                let mut failing = net.failing_connects.lock().unwrap();
                if *failing > 0 {
                    *failing -= 1;
                    return Err(TransportError::HostNotFound(peer_name.to_string()));
                }
            }

            let (tx, rx) = mpsc::channel(16);
            net.peers.lock().unwrap().insert(id, tx);
            let mut live = net.live.lock().unwrap();
            live.insert(id);
            net.max_live.fetch_max(live.len(), Ordering::SeqCst);

            Ok(PortHandle {
                port: Box::new(FakePort {
                    id,
                    net: Arc::clone(net),
                }),
                events: rx,
            })
        }
    }

    #[async_trait]
    impl NativePort for FakePort {
        async fn post(&self, message: &Value) -> Result<(), TransportError> {
            if self.net.reject_posts.load(Ordering::SeqCst)
                || !self.net.live.lock().unwrap().contains(&self.id)
            {
                return Err(TransportError::PortClosed);
            }
            self.net.posted.lock().unwrap().push(message.clone());
            Ok(())
        }

        fn disconnect(&self) {
            self.net.live.lock().unwrap().remove(&self.id);
        }
    }

    fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            peer_name: "com.example.test".to_string(),
            reconnect_initial_backoff_ms: 1,
            reconnect_max_backoff_ms: 4,
        }
    }

    fn manager() -> (ConnectionManager, Arc<FakeNetwork>, mpsc::Receiver<Value>) {
        let net = Arc::new(FakeNetwork::default());
        let (tx, rx) = mpsc::channel(16);
        let manager = ConnectionManager::new(
            test_config(),
            Arc::new(FakeTransport(Arc::clone(&net))),
            tx,
        );
        (manager, net, rx)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_ensure_connected_is_idempotent() {
        let (manager, net, _rx) = manager();

        manager.ensure_connected().await.unwrap();
        manager.ensure_connected().await.unwrap();

        assert_eq!(net.connects.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ConnectionState::Connected);
        // Exactly one ping per successful connect
        assert_eq!(net.posted(), vec![json!({"action": "ping"})]);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_connected_single_attempt() {
        let (manager, net, _rx) = manager();

        let (a, b) = tokio::join!(manager.ensure_connected(), manager.ensure_connected());
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(net.connects.load(Ordering::SeqCst), 1);
        assert_eq!(net.max_live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_peer_reports_connection_error() {
        let (manager, net, _rx) = manager();
        net.fail_next_connects(1);

        let err = manager.ensure_connected().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Unreachable { .. }));
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.ensure_connected().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_failed_connect_recovers_without_caller() {
        let (manager, net, _rx) = manager();
        net.fail_next_connects(2);

        assert!(manager.ensure_connected().await.is_err());

        wait_until(|| manager.state() == ConnectionState::Connected).await;
        // Failed call, one failed background retry, then success
        assert_eq!(net.connects.load(Ordering::SeqCst), 3);
        assert_eq!(net.live_count(), 1);
        assert_eq!(net.max_live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handshake_failure() {
        let (manager, net, _rx) = manager();
        net.reject_posts.store(true, Ordering::SeqCst);

        let err = manager.ensure_connected().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Handshake { .. }));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(net.live_count(), 0);

        // Peer starts accepting again; the background retry picks it up
        net.reject_posts.store(false, Ordering::SeqCst);
        wait_until(|| manager.state() == ConnectionState::Connected).await;
        assert_eq!(net.live_count(), 1);
        assert_eq!(net.posted(), vec![json!({"action": "ping"})]);
    }

    #[tokio::test]
    async fn test_reconnects_after_disconnect() {
        let (manager, net, _rx) = manager();
        let mut transitions = manager.subscribe();

        manager.ensure_connected().await.unwrap();
        net.drop_peer(0).await;

        wait_until(|| {
            net.connects.load(Ordering::SeqCst) == 2 && manager.state() == ConnectionState::Connected
        })
        .await;

        let mut seen = Vec::new();
        while let Ok(state) = transitions.try_recv() {
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
        assert_eq!(net.max_live.load(Ordering::SeqCst), 1);
        assert_eq!(net.live_count(), 1);
        assert_eq!(net.posted().len(), 2);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_trying() {
        let (manager, net, _rx) = manager();
        manager.ensure_connected().await.unwrap();

        net.fail_next_connects(3);
        net.drop_peer(0).await;

        wait_until(|| manager.state() == ConnectionState::Connected && net.live_count() == 1).await;
        // Initial connect, three failures, one success
        assert_eq!(net.connects.load(Ordering::SeqCst), 5);
        assert_eq!(net.max_live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (manager, _net, _rx) = manager();

        let err = manager.send(&json!({"action": "getTabMeta"})).await.unwrap_err();
        assert!(matches!(err, SendError::NotConnected));
    }

    #[tokio::test]
    async fn test_send_error_does_not_disconnect() {
        let (manager, net, _rx) = manager();
        manager.ensure_connected().await.unwrap();

        net.reject_posts.store(true, Ordering::SeqCst);
        let err = manager.send(&json!({"action": "getTabMeta"})).await.unwrap_err();
        assert!(matches!(
            err,
            SendError::Transport {
                generation: 1,
                source: TransportError::PortClosed
            }
        ));
        assert_eq!(manager.state(), ConnectionState::Connected);

        net.reject_posts.store(false, Ordering::SeqCst);
        manager.send(&json!({"action": "getTabMeta"})).await.unwrap();
        assert_eq!(net.posted().len(), 2);
    }

    #[tokio::test]
    async fn test_discard_port_forces_fresh_connect() {
        let (manager, net, _rx) = manager();
        manager.ensure_connected().await.unwrap();

        manager.discard_port(1).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(net.live_count(), 0);

        manager.ensure_connected().await.unwrap();
        assert_eq!(net.connects.load(Ordering::SeqCst), 2);

        // Stale generation leaves the new port alone
        manager.discard_port(1).await;
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(net.live_count(), 1);
    }

    #[tokio::test]
    async fn test_peer_records_are_forwarded() {
        let (manager, net, mut rx) = manager();
        manager.ensure_connected().await.unwrap();

        net.push_from_peer(0, json!({"action": "getTabMeta"})).await;

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, json!({"action": "getTabMeta"}));
    }

    #[tokio::test]
    async fn test_shutdown_stops_reconnecting() {
        let (manager, net, _rx) = manager();
        manager.ensure_connected().await.unwrap();

        manager.shutdown().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(net.live_count(), 0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(net.connects.load(Ordering::SeqCst), 1);
        assert!(matches!(
            manager.ensure_connected().await,
            Err(ConnectionError::Shutdown)
        ));
    }
}
