//! Owns the registered channels and routes replies back to the right one.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Registry of active channels keyed by name.
#[derive(Default)]
pub struct ChannelManager {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel. A channel with the same name is replaced.
    pub fn add(&mut self, channel: Box<dyn Channel>) {
        let name = channel.name().to_string();
        self.channels.insert(name, Arc::from(channel));
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    fn get(&self, name: &str) -> Result<&Arc<dyn Channel>, ChannelError> {
        self.channels
            .get(name)
            .ok_or_else(|| ChannelError::UnknownChannel(name.to_string()))
    }

    /// Start every channel and merge their inbound streams.
    ///
    /// A channel that fails to start is logged and skipped; the call only
    /// fails when no channel could be started.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for (name, channel) in &self.channels {
            match channel.start().await {
                Ok(s) => {
                    tracing::info!(channel = %name, "Channel started");
                    streams.push(s);
                }
                Err(e) => tracing::error!(channel = %name, "Failed to start channel: {e}"),
            }
        }

        if streams.is_empty() {
            return Err(ChannelError::StartupFailed {
                name: "all".into(),
                reason: "no channel could be started".into(),
            });
        }

        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Send a reply through the channel the message arrived on.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.get(&msg.channel)?.respond(msg, response).await
    }

    pub async fn send_typing(&self, msg: &IncomingMessage) -> Result<(), ChannelError> {
        self.get(&msg.channel)?.send_typing(msg).await
    }

    /// Run every channel's health check; returns the failures by name.
    pub async fn health_check_all(&self) -> Vec<(String, ChannelError)> {
        let mut failures = Vec::new();
        for (name, channel) in &self.channels {
            if let Err(e) = channel.health_check().await {
                failures.push((name.clone(), e));
            }
        }
        failures
    }

    pub async fn shutdown_all(&self) -> Result<(), ChannelError> {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = %name, "Channel shutdown failed: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct StubChannel {
        name: &'static str,
        inbound: Vec<&'static str>,
        sent: Arc<Mutex<Vec<String>>>,
        healthy: bool,
    }

    #[async_trait]
    impl Channel for StubChannel {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            let msgs: Vec<IncomingMessage> = self
                .inbound
                .iter()
                .map(|t| IncomingMessage::new(self.name, "u1", *t))
                .collect();
            Ok(Box::pin(stream::iter(msgs)))
        }

        async fn respond(
            &self,
            _msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push(response.content);
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            if self.healthy {
                Ok(())
            } else {
                Err(ChannelError::StartupFailed {
                    name: self.name.into(),
                    reason: "down".into(),
                })
            }
        }
    }

    fn stub(name: &'static str, inbound: Vec<&'static str>, healthy: bool) -> (StubChannel, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            StubChannel {
                name,
                inbound,
                sent: sent.clone(),
                healthy,
            },
            sent,
        )
    }

    #[tokio::test]
    async fn start_all_merges_streams() {
        let mut manager = ChannelManager::new();
        let (a, _) = stub("a", vec!["one", "two"], true);
        let (b, _) = stub("b", vec!["three"], true);
        manager.add(Box::new(a));
        manager.add(Box::new(b));

        let stream = manager.start_all().await.unwrap();
        let mut contents: Vec<String> = stream.map(|m| m.content).collect().await;
        contents.sort();
        assert_eq!(contents, vec!["one", "three", "two"]);
    }

    #[tokio::test]
    async fn start_all_with_no_channels_fails() {
        let manager = ChannelManager::new();
        assert!(manager.start_all().await.is_err());
    }

    #[tokio::test]
    async fn respond_routes_by_channel_name() {
        let mut manager = ChannelManager::new();
        let (a, sent_a) = stub("a", vec![], true);
        let (b, sent_b) = stub("b", vec![], true);
        manager.add(Box::new(a));
        manager.add(Box::new(b));

        let msg = IncomingMessage::new("b", "u1", "hi");
        manager.respond(&msg, OutgoingResponse::text("hello b")).await.unwrap();

        assert!(sent_a.lock().unwrap().is_empty());
        assert_eq!(*sent_b.lock().unwrap(), vec!["hello b"]);

        let stray = IncomingMessage::new("zzz", "u1", "hi");
        assert!(manager.respond(&stray, OutgoingResponse::text("x")).await.is_err());
    }

    #[tokio::test]
    async fn health_check_reports_failures() {
        let mut manager = ChannelManager::new();
        let (ok, _) = stub("ok", vec![], true);
        let (bad, _) = stub("bad", vec![], false);
        manager.add(Box::new(ok));
        manager.add(Box::new(bad));

        let failures = manager.health_check_all().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "bad");
    }
}
