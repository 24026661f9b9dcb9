//! Runtime services and the relay loop.

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    event::{Event, render::MessageRenderer},
    service::{
        bus::{BusClient, GenericBusClient},
        chat::{ChatClient, ChatSession},
    },
};

/// The running relay.
///
/// A `Runtime` only exists once startup has fully succeeded: the renderer is
/// built, the bus subscriber is started, and every room is joined.
pub struct Runtime {
    /// The event renderer.
    pub renderer: MessageRenderer,
    /// The bus subscriber.
    pub bus: BusClient,
    /// The authenticated chat session.
    pub session: ChatSession,
}

impl Runtime {
    /// Create a new runtime instance.
    ///
    /// Any error here is a startup failure; see `ExitStatus::of` for how it maps to an exit code.
    #[instrument(skip_all)]
    pub async fn new(config: &Config, bus: BusClient, chat: ChatClient) -> Res<Self> {
        let renderer = MessageRenderer::from_config(config).context("Could not load message templates")?;
        info!("Loaded {} message template(s).", renderer.registry().len());

        let session = ChatSession::open(chat, config).await?;

        Ok(Self { renderer, bus, session })
    }

    /// Consume the bus forever, one message at a time.
    ///
    /// Returns only when the bus fails.
    pub async fn start(&mut self) -> Void {
        loop {
            let parts = self.bus.recv().await?;
            self.relay(&parts).await;
        }
    }

    /// Decode, render and broadcast a single bus message.
    ///
    /// Returns how many rooms received it; undecodable messages are dropped.
    #[instrument(skip_all)]
    pub async fn relay(&self, parts: &[Vec<u8>]) -> usize {
        let event = match Event::from_parts(parts) {
            Ok(event) => event,
            Err(err) => {
                warn!("Dropping undecodable bus message: {}", err);
                return 0;
            }
        };

        debug!("Relaying {}.", event.tag);

        let text = self.renderer.to_display_text(&event);
        let delivered = self.session.broadcast(&text).await;

        if delivered < self.session.rooms().len() {
            warn!("Delivered {} to {} of {} room(s).", event.tag, delivered, self.session.rooms().len());
        }

        delivered
    }
}
