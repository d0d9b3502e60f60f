//! Session lifecycle against the automation server
//!
//! The server is a singleton automation target shared with the desktop UI
//! of the CAD application — it may be started or stopped by a human between
//! any two calls. The connector therefore never assumes exclusive
//! ownership: connecting binds handles, disconnecting drops them, and
//! [`SessionConnector::ensure_valid`] silently re-attaches when the old
//! handles have gone stale.
//!
//! Session state is an explicit [`AutomationSession`] value owned by one
//! worker at a time; there is no process-wide connector state.

use crate::error::{AutomationError, Result};
use crate::server::{Document, EntityCollection, ServerConnector, ServerHandle};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default time to wait for a document to be opened
pub const DEFAULT_DOCUMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting for a document
pub const DOCUMENT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Options for [`SessionConnector::connect`]
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Wait until the server reports at least one open document
    pub wait_for_document: bool,
    /// How long to wait for that document
    pub timeout: Duration,
    /// Interval between document-count polls
    pub poll_interval: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            wait_for_document: true,
            timeout: DEFAULT_DOCUMENT_TIMEOUT,
            poll_interval: DOCUMENT_POLL_INTERVAL,
        }
    }
}

impl ConnectOptions {
    /// Bind immediately, failing if no document is open
    pub fn no_wait() -> Self {
        Self {
            wait_for_document: false,
            ..Self::default()
        }
    }
}

/// Connection metadata recorded at bind time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub server_version: String,
    pub document_name: String,
    pub document_count: usize,
    /// Entities in the bound drawing space at bind time (informational —
    /// the live collection may change afterwards)
    pub entity_count: usize,
}

/// A live session: server handle, active document, and its drawing space
///
/// Connected iff all three handles are present; any unrecoverable fault or
/// an explicit disconnect clears them all together. Handles are owned by
/// whichever worker holds the session — never share them across threads
/// without a fresh [`SessionConnector::ensure_valid`] check.
#[derive(Default)]
pub struct AutomationSession {
    server: Option<ServerHandle>,
    document: Option<Box<dyn Document>>,
    space: Option<Box<dyn EntityCollection>>,
    info: Option<ConnectionInfo>,
}

impl std::fmt::Debug for AutomationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationSession")
            .field("connected", &self.is_connected())
            .field("info", &self.info)
            .finish()
    }
}

impl AutomationSession {
    /// A session with no handles bound
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.server.is_some() && self.document.is_some() && self.space.is_some()
    }

    /// The server handle, or `NotConnected`
    pub fn server(&self) -> Result<&ServerHandle> {
        self.server.as_ref().ok_or(AutomationError::NotConnected)
    }

    /// The active document handle, or `NotConnected`
    pub fn document(&self) -> Result<&dyn Document> {
        self.document
            .as_deref()
            .ok_or(AutomationError::NotConnected)
    }

    /// The bound drawing-space collection, or `NotConnected`
    pub fn space(&self) -> Result<&dyn EntityCollection> {
        self.space.as_deref().ok_or(AutomationError::NotConnected)
    }

    /// Metadata captured when the session was bound
    pub fn info(&self) -> Option<&ConnectionInfo> {
        self.info.as_ref()
    }

    /// Live snapshot of the bound document, re-queried from the server
    ///
    /// Unlike [`info`](Self::info) this reflects the current server state;
    /// the document count and entity count may differ from bind time.
    pub fn document_info(&self) -> Result<ConnectionInfo> {
        let server = self.server()?;
        let document = self.document()?;
        let space = self.space()?;
        Ok(ConnectionInfo {
            server_version: server.version()?,
            document_name: document.name()?,
            document_count: server.document_count()?,
            entity_count: space.len()?,
        })
    }

    fn clear(&mut self) {
        self.space = None;
        self.document = None;
        self.server = None;
        self.info = None;
    }
}

/// Acquires, validates and re-acquires sessions
pub struct SessionConnector {
    connector: Arc<dyn ServerConnector>,
}

impl SessionConnector {
    pub fn new(connector: Arc<dyn ServerConnector>) -> Self {
        Self { connector }
    }

    /// Establish a session: attach to a running server, else launch one,
    /// optionally wait for a document, then bind to the active document
    /// and its primary drawing space
    pub fn connect(&self, options: &ConnectOptions) -> Result<AutomationSession> {
        let server = self
            .connector
            .attach()
            .or_else(|| {
                log::info!("no running server instance, launching a new one");
                self.connector.launch()
            })
            .ok_or(AutomationError::ServerUnavailable)?;

        if options.wait_for_document {
            self.wait_for_document(&server, options)?;
        }

        let mut session = AutomationSession::disconnected();
        match Self::bind(&mut session, server) {
            Ok(()) => {
                if let Some(info) = session.info() {
                    log::info!(
                        "connected to server {} (document: {}, {} open)",
                        info.server_version,
                        info.document_name,
                        info.document_count
                    );
                }
                Ok(session)
            }
            Err(err) => {
                // Never expose a partially bound session
                session.clear();
                Err(err)
            }
        }
    }

    /// Probe the session's server handle; on fault, clear everything and
    /// try a single silent re-attach (attach only — no launch, no wait).
    /// Returns whether the session is usable afterwards.
    pub fn ensure_valid(&self, session: &mut AutomationSession) -> bool {
        if let Some(server) = &session.server {
            if session.document.is_some() && server.version().is_ok() {
                return true;
            }
        }

        log::warn!("session handles are stale, attempting silent re-attach");
        session.clear();

        let Some(server) = self.connector.attach() else {
            return false;
        };
        match Self::bind(session, server) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("re-attach failed: {err}");
                session.clear();
                false
            }
        }
    }

    /// Drop local handles; the server process keeps running — it may be
    /// serving other clients
    pub fn disconnect(&self, session: &mut AutomationSession) {
        session.clear();
    }

    fn wait_for_document(&self, server: &ServerHandle, options: &ConnectOptions) -> Result<()> {
        let started = Instant::now();
        while server.document_count()? == 0 {
            if started.elapsed() > options.timeout {
                return Err(AutomationError::NoDocumentTimeout {
                    waited_secs: options.timeout.as_secs(),
                });
            }
            std::thread::sleep(options.poll_interval);
        }
        Ok(())
    }

    fn bind(session: &mut AutomationSession, server: ServerHandle) -> Result<()> {
        let version = server.version()?;
        let document = server.active_document()?;
        let space = document.model_space()?;

        let info = ConnectionInfo {
            server_version: version,
            document_name: document.name()?,
            document_count: server.document_count()?,
            entity_count: space.len()?,
        };

        session.server = Some(server);
        session.document = Some(document);
        session.space = Some(space);
        session.info = Some(info);
        Ok(())
    }
}
