//! Chat service integration for mirk.
//!
//! This module provides functionality for publishing into chat rooms:
//! - Authenticating against the chat backend
//! - Joining the configured rooms
//! - Sending formatted text to every joined room
//! - Running the inbound listener, which ignores room traffic
//!
//! It defines the `GenericChatClient` trait that can be implemented for different
//! chat services, with a default implementation for Matrix.

pub mod matrix;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::base::{
    config::Config,
    types::{Res, Void},
};

// Errors.

/// Chat backend failures that callers need to tell apart.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Bad username or password: {message}")]
    BadCredentials { message: String },

    #[error("Could not log in, check the server details are correct: {message}")]
    LoginFailed { message: String },

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Room ID/alias `{room}` is in the wrong format: {message}")]
    MalformedRoom { room: String, message: String },

    #[error("Could not find or join room `{room}`: {message}")]
    RoomUnavailable { room: String, message: String },

    #[error("Failed to send message to room `{room}`: {message}")]
    SendFailed { room: String, message: String },
}

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the core functionality for publishing into a chat
/// platform like Matrix. Implementing this trait allows different chat
/// services to be used with mirk.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Authenticate with the configured credentials.
    ///
    /// Must be called once before any other method.
    async fn login(&self, username: &str, password: &str) -> Void;

    /// Join a room by ID or alias.
    ///
    /// Returns the handle used to send into the room.
    async fn join_room(&self, room: &str) -> Res<Room>;

    /// Send HTML-formatted text to a joined room.
    async fn send_html(&self, room: &Room, html: &str) -> Void;

    /// Receive inbound room traffic until the connection is dropped.
    ///
    /// Everything received is discarded; implementations must never send
    /// anything from here.
    async fn listen(&self) -> Void;
}

// Structs.

/// A joined room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// The identifier or alias as configured.
    pub alias: String,
    /// The backend's canonical room ID.
    pub id: String,
}

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}

/// The live, authenticated chat session.
///
/// Owns the joined rooms (in configuration order) and the inbound listener
/// task. The listener is aborted when the session is dropped.
pub struct ChatSession {
    client: ChatClient,
    rooms: Vec<Room>,
    listener: JoinHandle<()>,
}

impl ChatSession {
    /// Log in, join every configured room, and start the inbound listener.
    ///
    /// Any failure here is fatal for startup: a session never exists with
    /// only some of its rooms joined.
    #[instrument(name = "ChatSession::open", skip_all)]
    pub async fn open(client: ChatClient, config: &Config) -> Res<Self> {
        info!("Logging into {} as {} ...", config.host, config.username);
        client.login(&config.username, &config.password).await?;

        info!("Joining {} room(s) ...", config.rooms.len());
        let mut rooms = Vec::with_capacity(config.rooms.len());
        for alias in &config.rooms {
            let room = client.join_room(alias).await?;
            info!("Joined {} ({}).", room.alias, room.id);
            rooms.push(room);
        }

        let listener = {
            let client = client.clone();
            tokio::spawn(async move {
                if let Err(err) = client.listen().await {
                    error!("Inbound listener stopped: {}", err);
                }
            })
        };

        info!("Logged in, ready to publish.");

        Ok(Self { client, rooms, listener })
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// Send `text` to every joined room, in configuration order.
    ///
    /// A failing room is logged and skipped; returns how many rooms accepted the message.
    #[instrument(skip_all)]
    pub async fn broadcast(&self, text: &str) -> usize {
        let mut delivered = 0;

        for room in &self.rooms {
            match self.client.send_html(room, text).await {
                Ok(()) => delivered += 1,
                Err(err) => error!("Could not publish to {}: {}", room.alias, err),
            }
        }

        delivered
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
