// File: src/connection/manager.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{error, info, trace, warn};

use armlink_common::models::{ArmTelemetry, Command, ConnectionEvent, ConnectionState};
use crate::Error;
use super::session::{run_session, SessionEnd};

/// Receiving side of the manager's lifecycle notifications.
pub type ConnectionEvents = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Owns the persistent WebSocket to the arm.
///
/// Cheap to clone; all clones drive the same connection. `connect` and
/// `close` are serialized, so at most one session is ever open per manager.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    session: Mutex<Option<Session>>,
    lifecycle: tokio::sync::Mutex<()>,
    telemetry: Mutex<Option<ArmTelemetry>>,
    connect_timeout: Option<Duration>,
    sessions_opened: AtomicU64,
}

struct Session {
    id: u64,
    outgoing: mpsc::UnboundedSender<WsMessage>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    pub fn new(connect_timeout: Option<Duration>) -> (Self, ConnectionEvents) {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Inner {
            state,
            events: events_tx,
            session: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            telemetry: Mutex::new(None),
            connect_timeout,
            sessions_opened: AtomicU64::new(0),
        };
        (Self { inner: Arc::new(inner) }, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// A receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Latest encoder report received from the arm.
    pub fn telemetry(&self) -> Option<ArmTelemetry> {
        *self.inner.telemetry.lock()
    }

    /// Number of sessions successfully opened over the manager's lifetime.
    pub fn sessions_opened(&self) -> u64 {
        self.inner.sessions_opened.load(Ordering::SeqCst)
    }

    /// Opens a new session to `url`, gracefully closing any existing one
    /// first. On success the arm is sent a `home` command straight away.
    ///
    /// Failures leave the manager in `Failed` and are also reported as a
    /// `ConnectionEvent::Error`. Nothing is retried here.
    pub async fn connect(&self, url: &str) -> Result<(), Error> {
        let _guard = self.inner.lifecycle.lock().await;

        self.shutdown_session().await;

        self.inner.set_state(ConnectionState::Connecting);
        info!("[ArmLink] Connecting to {}", url);

        let attempt = connect_async(url);
        let result = match self.inner.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(res) => res.map_err(Error::from),
                Err(elapsed) => Err(Error::from(elapsed)),
            },
            None => attempt.await.map_err(Error::from),
        };

        let ws_stream = match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                let message = format!("Failed to connect to {url}: {e}");
                error!("[ArmLink] {}", message);
                self.inner.set_state(ConnectionState::Failed);
                self.inner.emit(ConnectionEvent::Error { message: message.clone() });
                return Err(Error::Connect(message));
            }
        };

        let id = self.inner.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        // Re-zero the arm on every fresh session. Queued before the state
        // turns Open so no other sender can get a move in ahead of it.
        let home = Command::home().to_wire()?;
        out_tx
            .send(WsMessage::text(home.clone()))
            .map_err(|_| Error::Connect("command session has ended".into()))?;
        trace!("[ArmLink] => {}", home);

        // The session must be registered (and the state Open) before the
        // task runs, so an immediate peer close is attributed to it.
        *self.inner.session.lock() = Some(Session {
            id,
            outgoing: out_tx,
            shutdown: Some(shutdown_tx),
            task: None,
        });
        self.inner.set_state(ConnectionState::Open);

        let handle = tokio::spawn(run_session(
            id,
            ws_stream,
            out_rx,
            shutdown_rx,
            Arc::downgrade(&self.inner),
        ));
        if let Some(session) = self.inner.session.lock().as_mut() {
            if session.id == id {
                session.task = Some(handle);
            }
        }

        info!("[ArmLink] Connected to arm (session #{})", id);
        self.inner.emit(ConnectionEvent::Opened { url: url.to_string() });
        Ok(())
    }

    /// Gracefully closes the open session. No-op when nothing is open.
    ///
    /// Waits for a connect already in progress to finish, then closes the
    /// session it opened.
    pub async fn close(&self) -> Result<(), Error> {
        let _guard = self.inner.lifecycle.lock().await;
        self.shutdown_session().await;

        // A connect cancelled part way leaves no session behind.
        if matches!(self.state(), ConnectionState::Connecting | ConnectionState::Closing) {
            self.inner.set_state(ConnectionState::Disconnected);
        }
        Ok(())
    }

    /// Queues `command` on the open session.
    ///
    /// Returns `Error::NotOpen` when the connection is not `Open`; callers
    /// are expected to check `is_open()` first.
    pub fn send(&self, command: &Command) -> Result<(), Error> {
        let state = self.state();
        if !state.is_open() {
            return Err(Error::NotOpen(state));
        }
        let text = command.to_wire()?;

        let guard = self.inner.session.lock();
        let session = guard.as_ref().ok_or(Error::NotOpen(state))?;
        session
            .outgoing
            .send(WsMessage::text(text.clone()))
            .map_err(|_| Error::Connect("command session has ended".into()))?;

        trace!("[ArmLink] => {}", text);
        Ok(())
    }

    async fn shutdown_session(&self) {
        let session = self.inner.session.lock().take();
        let Some(mut session) = session else {
            return;
        };

        self.inner.set_state(ConnectionState::Closing);
        info!("[ArmLink] Closing session #{}", session.id);

        if let Some(tx) = session.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = session.task.take() {
            if let Err(e) = task.await {
                warn!("[ArmLink] Session #{} task ended abnormally: {}", session.id, e);
            }
        }

        self.inner.set_state(ConnectionState::Disconnected);
        self.inner.emit(ConnectionEvent::Closed {
            reason: None,
            requested: true,
        });
        info!("[ArmLink] Session #{} closed", session.id);
    }
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: ConnectionEvent) {
        // The receiver may be gone during shutdown.
        let _ = self.events.send(event);
    }

    pub(super) fn record_telemetry(&self, telemetry: ArmTelemetry) {
        *self.telemetry.lock() = Some(telemetry);
    }

    /// Called by a session task when it stops. Only a session that is still
    /// the current one may change state; explicit closes have already
    /// detached theirs.
    pub(super) fn finish_session(&self, id: u64, end: SessionEnd) {
        {
            let mut guard = self.session.lock();
            match guard.as_ref() {
                Some(session) if session.id == id => {
                    guard.take();
                }
                _ => return,
            }
        }

        match end {
            SessionEnd::Requested => {
                self.set_state(ConnectionState::Disconnected);
            }
            SessionEnd::ClosedByPeer(reason) => {
                warn!("[ArmLink] Session #{} closed by arm: {:?}", id, reason);
                self.set_state(ConnectionState::Disconnected);
                self.emit(ConnectionEvent::Closed {
                    reason,
                    requested: false,
                });
            }
            SessionEnd::Error(message) => {
                error!("[ArmLink] Session #{} failed: {}", id, message);
                self.set_state(ConnectionState::Failed);
                self.emit(ConnectionEvent::Error {
                    message: message.clone(),
                });
                self.emit(ConnectionEvent::Closed {
                    reason: Some(message),
                    requested: false,
                });
            }
        }
    }
}
