//! Session registry
//!
//! All writes to the registry (join, leave, broadcast, shutdown) are serialized through
//! one dispatch task. Reads go straight to the concurrent map, so lookups never wait on
//! a join that is busy talking to the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use wattline_protocol::{DeviceType, Event};

use super::audit::ActivityAudit;
use super::session::{ClientSession, OutboundQueue};
use crate::models::ActivityStatus;
use crate::repositories::{bounded, DeviceStore, StoreError};

/// Capacity of the join and broadcast intakes
const INTAKE_CAPACITY: usize = 256;

/// Message sent to every device right after it is admitted
pub const WELCOME_MESSAGE: &str = "connected";

/// Errors returned by [`SessionManager::register`] and [`SessionManager::broadcast`]
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("device {0} already has an active session")]
    DuplicateSession(String),

    #[error("failed to persist device: {0}")]
    Persistence(#[from] StoreError),

    #[error("session registry is not running")]
    Unavailable,
}

/// Errors returned by [`SessionManager::command`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("device {0} is not connected")]
    NotConnected(String),

    #[error("session of device {0} is closing")]
    QueueClosed(String),
}

/// Registry tuning
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Upper bound on the store call made while admitting a device
    pub store_timeout: Duration,
    /// Text of the `message` event queued for every new session
    pub welcome_message: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            welcome_message: WELCOME_MESSAGE.to_string(),
        }
    }
}

type JoinReply = Result<(Arc<ClientSession>, OutboundQueue), RegistryError>;

struct JoinRequest {
    id: String,
    device_type: DeviceType,
    reply: oneshot::Sender<JoinReply>,
}

struct LeaveRequest {
    id: String,
    /// Only remove the entry if it still belongs to this session
    serial: Option<u64>,
    done: Option<oneshot::Sender<bool>>,
}

/// Handle to the session registry
///
/// Cheap to clone; every clone talks to the same dispatch task.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<DashMap<String, Arc<ClientSession>>>,
    join_tx: mpsc::Sender<JoinRequest>,
    leave_tx: mpsc::UnboundedSender<LeaveRequest>,
    broadcast_tx: mpsc::Sender<Event>,
    shutdown: CancellationToken,
}

impl SessionManager {
    /// Build the registry and spawn its dispatch task
    pub fn start(store: Arc<dyn DeviceStore>, config: RegistryConfig) -> Self {
        let sessions = Arc::new(DashMap::new());
        let (join_tx, join_rx) = mpsc::channel(INTAKE_CAPACITY);
        let (leave_tx, leave_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(INTAKE_CAPACITY);
        let shutdown = CancellationToken::new();

        let dispatcher = Dispatcher {
            sessions: sessions.clone(),
            audit: ActivityAudit::spawn(store.clone()),
            store,
            config,
            next_serial: 0,
            join_rx,
            leave_rx,
            broadcast_rx,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(dispatcher.run());

        Self {
            sessions,
            join_tx,
            leave_tx,
            broadcast_tx,
            shutdown,
        }
    }

    /// Admit a device. Fails if the id already has a session or the store is unreachable.
    pub async fn register(
        &self,
        id: impl Into<String>,
        device_type: DeviceType,
    ) -> Result<ConnectedSession, RegistryError> {
        if self.shutdown.is_cancelled() {
            return Err(RegistryError::Unavailable);
        }

        let (reply, rx) = oneshot::channel();
        let request = JoinRequest {
            id: id.into(),
            device_type,
            reply,
        };
        self.join_tx
            .send(request)
            .await
            .map_err(|_| RegistryError::Unavailable)?;

        let (session, queue) = rx.await.map_err(|_| RegistryError::Unavailable)??;
        Ok(ConnectedSession {
            session,
            queue,
            leave_tx: self.leave_tx.clone(),
        })
    }

    /// Close and remove whatever session `id` has. Returns `false` if there was none.
    pub async fn unregister(&self, id: &str) -> bool {
        let (done, rx) = oneshot::channel();
        let request = LeaveRequest {
            id: id.to_string(),
            serial: None,
            done: Some(done),
        };
        if self.leave_tx.send(request).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Queue `event` for every session live when the dispatch task handles it
    pub async fn broadcast(&self, event: Event) -> Result<(), RegistryError> {
        self.broadcast_tx
            .send(event)
            .await
            .map_err(|_| RegistryError::Unavailable)
    }

    /// Queue `event` for a single device
    pub fn command(&self, id: &str, event: Event) -> Result<(), SendError> {
        let session = self
            .get(id)
            .ok_or_else(|| SendError::NotConnected(id.to_string()))?;
        session
            .enqueue(event)
            .map_err(|_| SendError::QueueClosed(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<Arc<ClientSession>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// When the device's current session was admitted
    pub fn connected_since(&self, id: &str) -> Option<DateTime<Utc>> {
        self.sessions.get(id).map(|entry| entry.value().connected_at())
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Ids of all live sessions, sorted
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Close every session and stop the dispatch task
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.join_tx.is_closed()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .field("running", &self.is_running())
            .finish()
    }
}

/// An admitted session together with its queue
///
/// Dropping it deregisters exactly this session; a newer session for the same device
/// is left alone.
#[derive(Debug)]
pub struct ConnectedSession {
    session: Arc<ClientSession>,
    queue: OutboundQueue,
    leave_tx: mpsc::UnboundedSender<LeaveRequest>,
}

impl ConnectedSession {
    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    pub fn id(&self) -> &str {
        self.session.id()
    }

    pub async fn next_outbound(&mut self) -> Option<Event> {
        self.queue.next_outbound().await
    }
}

impl Drop for ConnectedSession {
    fn drop(&mut self) {
        self.session.close();
        // The dispatch task may already be gone during shutdown
        let _ = self.leave_tx.send(LeaveRequest {
            id: self.session.id().to_string(),
            serial: Some(self.session.serial()),
            done: None,
        });
    }
}

/// Owner of all registry writes
struct Dispatcher {
    sessions: Arc<DashMap<String, Arc<ClientSession>>>,
    store: Arc<dyn DeviceStore>,
    audit: ActivityAudit,
    config: RegistryConfig,
    next_serial: u64,
    join_rx: mpsc::Receiver<JoinRequest>,
    leave_rx: mpsc::UnboundedReceiver<LeaveRequest>,
    broadcast_rx: mpsc::Receiver<Event>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    async fn run(mut self) {
        tracing::debug!("Session dispatcher started");

        loop {
            // Leaves go first so a device that reconnects right away is not refused
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(leave) = self.leave_rx.recv() => self.handle_leave(leave),
                join = self.join_rx.recv() => match join {
                    Some(join) => self.handle_join(join).await,
                    None => break,
                },
                Some(event) = self.broadcast_rx.recv() => self.handle_broadcast(event),
            }
        }

        self.close_all();
        tracing::info!("Session dispatcher stopped");
    }

    async fn handle_join(&mut self, request: JoinRequest) {
        let JoinRequest {
            id,
            device_type,
            reply,
        } = request;

        let result = self.admit(&id, device_type).await;

        // The caller went away while we were admitting it
        if let Err(Ok((session, _queue))) = reply.send(result) {
            tracing::debug!(device_id = %id, "Registrant gone before admission completed");
            self.evict(&session);
        }
    }

    async fn admit(&mut self, id: &str, device_type: DeviceType) -> JoinReply {
        if self.sessions.contains_key(id) {
            tracing::info!(device_id = %id, "Rejected duplicate device session");
            return Err(RegistryError::DuplicateSession(id.to_string()));
        }

        let is_new = bounded(
            self.config.store_timeout,
            self.store.get_or_create_device(id, device_type),
        )
        .await
        .map_err(|e| {
            tracing::warn!(device_id = %id, error = %e, "Device persistence failed, refusing session");
            RegistryError::Persistence(e)
        })?;
        if is_new {
            tracing::info!(device_id = %id, device_type = %device_type, "Registered new device");
        }

        self.next_serial += 1;
        let (session, queue) = ClientSession::open(id.to_string(), device_type, self.next_serial);
        self.sessions.insert(id.to_string(), session.clone());
        self.audit.record(id, ActivityStatus::On);

        // The queue was created above and cannot be closed yet
        let _ = session.enqueue(Event::message(self.config.welcome_message.as_str()));

        tracing::info!(
            device_id = %id,
            serial = session.serial(),
            active = self.sessions.len(),
            "Device session opened"
        );
        Ok((session, queue))
    }

    fn handle_leave(&mut self, request: LeaveRequest) {
        let removed = match request.serial {
            Some(serial) => self
                .sessions
                .remove_if(&request.id, |_, session| session.serial() == serial),
            None => self.sessions.remove(&request.id),
        };

        let found = match removed {
            Some((_, session)) => {
                session.close();
                self.audit.record(&request.id, ActivityStatus::Off);
                tracing::info!(
                    device_id = %request.id,
                    serial = session.serial(),
                    active = self.sessions.len(),
                    "Device session closed"
                );
                true
            }
            None => false,
        };

        if let Some(done) = request.done {
            let _ = done.send(found);
        }
    }

    fn handle_broadcast(&self, event: Event) {
        // Snapshot first so no map lock is held while enqueueing
        let targets: Vec<Arc<ClientSession>> =
            self.sessions.iter().map(|e| e.value().clone()).collect();

        let mut delivered = 0usize;
        for session in &targets {
            match session.enqueue(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::debug!(device_id = %session.id(), "Skipped closing session in broadcast")
                }
            }
        }
        tracing::trace!(event = %event.code(), delivered, "Broadcast dispatched");
    }

    fn evict(&self, session: &Arc<ClientSession>) {
        let serial = session.serial();
        if self
            .sessions
            .remove_if(session.id(), |_, s| s.serial() == serial)
            .is_some()
        {
            session.close();
            self.audit.record(session.id(), ActivityStatus::Off);
        }
    }

    fn close_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, session)) = self.sessions.remove(&id) {
                session.close();
                self.audit.record(&id, ActivityStatus::Off);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryDeviceStore;
    use assert_matches::assert_matches;

    fn start() -> (SessionManager, Arc<InMemoryDeviceStore>) {
        let store = Arc::new(InMemoryDeviceStore::new());
        let manager = SessionManager::start(store.clone(), RegistryConfig::default());
        (manager, store)
    }

    async fn wait_until<F: Fn() -> bool>(check: F) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_welcome_is_first_event() {
        let (manager, _store) = start();
        let mut conn = manager.register("dev1", DeviceType::SWITCH).await.unwrap();
        manager.command("dev1", Event::command_power(5)).unwrap();

        assert_eq!(conn.next_outbound().await, Some(Event::message("connected")));
        assert_eq!(conn.next_outbound().await, Some(Event::command_power(5)));
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails() {
        let (manager, _store) = start();
        let _conn = manager.register("dev1", DeviceType::SWITCH).await.unwrap();

        assert_matches!(
            manager.register("dev1", DeviceType::SWITCH).await,
            Err(RegistryError::DuplicateSession(id)) if id == "dev1"
        );
        assert_eq!(manager.count(), 1);
    }

    #[tokio::test]
    async fn test_reregister_after_unregister() {
        let (manager, _store) = start();
        let conn = manager.register("dev1", DeviceType::SWITCH).await.unwrap();
        assert!(manager.unregister("dev1").await);
        assert!(!manager.is_active("dev1"));
        assert!(conn.session().is_closed());

        let conn2 = manager.register("dev1", DeviceType::SWITCH).await.unwrap();
        assert!(conn2.session().serial() > conn.session().serial());
        assert!(manager.is_active("dev1"));
    }

    #[tokio::test]
    async fn test_reregister_right_after_drop() {
        let (manager, _store) = start();
        let conn = manager.register("dev1", DeviceType::SWITCH).await.unwrap();
        drop(conn);
        assert!(manager.register("dev1", DeviceType::SWITCH).await.is_ok());
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let (manager, _store) = start();
        let _conn = manager.register("dev1", DeviceType::SWITCH).await.unwrap();
        assert!(!manager.unregister("ghost").await);
        assert_eq!(manager.active_ids(), vec!["dev1".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_drop_keeps_newer_session() {
        let (manager, _store) = start();
        let old = manager.register("dev1", DeviceType::SWITCH).await.unwrap();
        manager.unregister("dev1").await;
        let new = manager.register("dev1", DeviceType::SWITCH).await.unwrap();

        drop(old);
        // A later unregister of an unknown id is processed after the stale leave
        manager.unregister("ghost").await;

        assert!(manager.is_active("dev1"));
        assert_eq!(
            manager.get("dev1").unwrap().serial(),
            new.session().serial()
        );
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session_once() {
        let (manager, _store) = start();
        let mut a = manager.register("a1", DeviceType::SWITCH).await.unwrap();
        let mut b = manager.register("b1", DeviceType::SWITCH).await.unwrap();
        assert_eq!(a.next_outbound().await, Some(Event::message("connected")));
        assert_eq!(b.next_outbound().await, Some(Event::message("connected")));

        manager.broadcast(Event::message("tick")).await.unwrap();
        manager.broadcast(Event::Disconnect).await.unwrap();

        for conn in [&mut a, &mut b] {
            assert_eq!(conn.next_outbound().await, Some(Event::message("tick")));
            assert_eq!(conn.next_outbound().await, Some(Event::Disconnect));
        }
    }

    #[tokio::test]
    async fn test_command_unknown_device() {
        let (manager, _store) = start();
        assert_eq!(
            manager.command("ghost", Event::command_power(1)),
            Err(SendError::NotConnected("ghost".to_string()))
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_persistence_failure_aborts_registration() {
        let (manager, store) = start();
        store.set_offline(true);

        assert_matches!(
            manager.register("dev1", DeviceType::SWITCH).await,
            Err(RegistryError::Persistence(_))
        );
        assert!(!manager.is_active("dev1"));
        assert!(manager.is_running());

        store.set_offline(false);
        assert!(manager.register("dev1", DeviceType::SWITCH).await.is_ok());
    }

    #[tokio::test]
    async fn test_activity_is_audited_in_order() {
        let (manager, store) = start();
        let conn = manager.register("dev1", DeviceType::SWITCH).await.unwrap();
        drop(conn);
        let conn = manager.register("dev1", DeviceType::SWITCH).await.unwrap();
        drop(conn);

        for _ in 0..100 {
            if store.activity_log("dev1").await.len() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            store.activity_log("dev1").await,
            vec![
                ActivityStatus::On,
                ActivityStatus::Off,
                ActivityStatus::On,
                ActivityStatus::Off
            ]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_shutdown_closes_all_sessions() {
        let (manager, _store) = start();
        let mut a = manager.register("a1", DeviceType::SWITCH).await.unwrap();
        let mut b = manager.register("b1", DeviceType::SWITCH).await.unwrap();

        manager.shutdown();
        wait_until(|| manager.count() == 0).await;

        // Welcome messages queued before shutdown are not replayed after close
        assert_eq!(a.next_outbound().await, None);
        assert_eq!(b.next_outbound().await, None);
        assert!(!manager.is_running());
        assert_matches!(
            manager.register("c1", DeviceType::SWITCH).await,
            Err(RegistryError::Unavailable)
        );
    }
}
