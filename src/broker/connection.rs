//! Lazily established, shared broker session
//!
//! The session (one connection plus its publishing channel) is created on
//! first use, reused until a failure invalidates it, and re-established
//! against a freshly shuffled endpoint list.

use std::sync::Arc;

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use tokio::sync::Mutex;

use super::errors::BrokerError;
use super::transport::{BrokerChannel, BrokerConnection, BrokerConnector};
use crate::config::{BrokerConfig, BrokerEndpoint};

/// A live connection with its publishing channel
#[derive(Clone)]
pub struct Session {
    pub connection: Arc<dyn BrokerConnection>,
    pub channel: Arc<dyn BrokerChannel>,
    pub endpoint: BrokerEndpoint,
}

impl Session {
    fn is_usable(&self) -> bool {
        self.connection.is_open() && self.channel.is_open()
    }
}

/// What a keep-alive tick found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    /// No session yet
    Idle,
    /// Heartbeats serviced on a live session
    Serviced,
    /// The session had closed and was discarded
    Cleared,
}

/// Owner of the cached session
pub struct ConnectionManager {
    connector: Arc<dyn BrokerConnector>,
    config: BrokerConfig,
    endpoints: Vec<BrokerEndpoint>,
    session: Mutex<Option<Session>>,
}

impl ConnectionManager {
    pub fn new(
        config: BrokerConfig,
        connector: Arc<dyn BrokerConnector>,
    ) -> Result<Self, BrokerError> {
        let endpoints = config.endpoints()?;
        Ok(Self {
            connector,
            config,
            endpoints,
            session: Mutex::new(None),
        })
    }

    /// Current session, connecting first if there is none
    pub async fn session(&self) -> Result<Session, BrokerError> {
        let mut guard = self.session.lock().await;

        if let Some(session) = guard.as_ref() {
            if session.is_usable() {
                return Ok(session.clone());
            }
            debug!("Cached broker session to {} is closed, reconnecting", session.endpoint);
            if let Some(stale) = guard.take() {
                close_quietly(stale).await;
            }
        }

        let session = self.establish().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Current session without connecting
    pub async fn current(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    /// Discard the cached session so the next use reconnects
    pub async fn invalidate(&self) {
        let stale = self.session.lock().await.take();
        if let Some(session) = stale {
            info!("Invalidating broker session to {}", session.endpoint);
            close_quietly(session).await;
        }
    }

    /// One keep-alive tick
    ///
    /// Errors clear the session before being returned.
    pub async fn heartbeat(&self) -> Result<HeartbeatStatus, BrokerError> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.as_ref() else {
            return Ok(HeartbeatStatus::Idle);
        };

        if !session.connection.is_open() {
            debug!("Broker connection to {} closed, clearing session", session.endpoint);
            *guard = None;
            return Ok(HeartbeatStatus::Cleared);
        }

        match session.connection.heartbeat().await {
            Ok(()) => Ok(HeartbeatStatus::Serviced),
            Err(e) => {
                *guard = None;
                Err(e)
            }
        }
    }

    /// Close and forget the session
    pub async fn close(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            close_quietly(session).await;
        }
    }

    async fn establish(&self) -> Result<Session, BrokerError> {
        let mut candidates = self.endpoints.clone();
        candidates.shuffle(&mut rand::rng());

        let attempts = self.config.connection_attempts.max(1);
        for endpoint in &candidates {
            for attempt in 1..=attempts {
                match self.open_session(endpoint).await {
                    Ok(session) => {
                        info!("Connected to broker at {}", endpoint);
                        return Ok(session);
                    }
                    Err(e) => {
                        warn!(
                            "Broker connect to {} failed (attempt {}/{}): {}",
                            endpoint, attempt, attempts, e
                        );
                    }
                }
            }
        }

        Err(BrokerError::NoBrokerAvailable {
            attempted: candidates.len(),
        })
    }

    async fn open_session(&self, endpoint: &BrokerEndpoint) -> Result<Session, BrokerError> {
        let connection = self.connector.connect(endpoint, &self.config).await?;
        let channel = match connection.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close().await;
                return Err(e);
            }
        };
        if self.config.require_confirmations {
            if let Err(e) = channel.confirm_select().await {
                let _ = connection.close().await;
                return Err(e);
            }
        }
        Ok(Session {
            connection,
            channel,
            endpoint: endpoint.clone(),
        })
    }
}

async fn close_quietly(session: Session) {
    if let Err(e) = session.channel.close().await {
        debug!("Closing broker channel to {}: {}", session.endpoint, e);
    }
    if let Err(e) = session.connection.close().await {
        debug!("Closing broker connection to {}: {}", session.endpoint, e);
    }
}
