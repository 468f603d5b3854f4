//! axum WebSocket as a registry transport.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use keycast_registry::{Duplex, FrameSink, FrameSource, Inbound, TransportError};

/// An upgraded axum socket, ready to hand to the registry.
pub struct WsDuplex(pub WebSocket);

impl Duplex for WsDuplex {
    type Sink = WsSink;
    type Source = WsSource;

    fn split(self) -> (WsSink, WsSource) {
        let (tx, rx) = self.0.split();
        (WsSink(tx), WsSource(rx))
    }
}

pub struct WsSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(io_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await.map_err(io_error)
    }
}

pub struct WsSource(SplitStream<WebSocket>);

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<Inbound, TransportError>> {
        let msg = self.0.next().await?;
        Some(msg.map(inbound).map_err(io_error))
    }
}

fn inbound(msg: Message) -> Inbound {
    match msg {
        Message::Text(text) => Inbound::Text(text.as_str().to_owned()),
        Message::Binary(data) => Inbound::Binary(data.to_vec()),
        Message::Ping(_) | Message::Pong(_) => Inbound::Control,
        Message::Close(_) => Inbound::Close,
    }
}

fn io_error(e: axum::Error) -> TransportError {
    TransportError::Io(e.to_string())
}
