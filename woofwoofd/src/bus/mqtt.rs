use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubscribeFilter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use anyhow::{bail, Context, Result};
use shared::types::Action;
use crate::config::Config;
use super::dispatch::Dispatch;

const DEFAULT_PORT: u16 = 1883;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// MQTT connection carrying JSON-encoded actions.
/// Actions are published to the topic routed by their handle segment.
pub struct MqttTransport {
    tasks: Vec<JoinHandle<()>>,
}

impl MqttTransport {
    /// Connect to the broker and subscribe to every routed topic.
    /// Returns the inbound action stream and the outbound dispatch handle.
    pub async fn connect(
        config: &Config,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<Action>, Dispatch)> {
        let (host, port) = parse_broker_uri(&config.broker.uri)?;

        let hostname = hostname::get()
            .context("Failed to get system hostname")?
            .to_string_lossy()
            .to_string();
        let client_id = format!("{}-{}", config.name, hostname);

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let routes = config.routes();
        let topics: BTreeSet<String> = routes.values().cloned().collect();

        // The bus is required; failing the first connect is fatal
        loop {
            let event = eventloop
                .poll()
                .await
                .with_context(|| format!("Failed to connect to broker {}", config.broker.uri))?;
            if let Event::Incoming(Packet::ConnAck(_)) = event {
                break;
            }
        }
        tracing::info!("Connected to broker {}", config.broker.uri);
        subscribe_all(&client, &topics)?;

        let (inbound_tx, inbound_rx) = mpsc::channel(1024);
        let (outbound_tx, outbound_rx) = mpsc::channel(256);

        let receiver = tokio::spawn(run_receiver(
            client.clone(),
            eventloop,
            topics,
            inbound_tx,
            cancel.clone(),
        ));
        let publisher = tokio::spawn(run_publisher(client, routes, outbound_rx, cancel));

        Ok((
            Self { tasks: vec![receiver, publisher] },
            inbound_rx,
            Dispatch::new(outbound_tx),
        ))
    }

    /// Wait for the transport tasks after cancellation
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Bus task failed: {}", e);
            }
        }
    }
}

fn subscribe_all(client: &AsyncClient, topics: &BTreeSet<String>) -> Result<()> {
    let filters = topics
        .iter()
        .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtLeastOnce));
    client
        .try_subscribe_many(filters)
        .context("Failed to subscribe to action topics")?;

    tracing::info!("Subscribed to {} topics", topics.len());
    Ok(())
}

/// Polls the MQTT event loop, decoding publishes into actions.
/// Connection errors are retried after a short back-off.
async fn run_receiver(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topics: BTreeSet<String>,
    tx: mpsc::Sender<Action>,
    cancel: CancellationToken,
) {
    let mut disconnecting = false;

    loop {
        tokio::select! {
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match serde_json::from_slice::<Action>(&publish.payload) {
                            Ok(action) => {
                                if tx.send(action).await.is_err() {
                                    tracing::debug!("Action stream dropped");
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Skipping undecodable message on {}: {}", publish.topic, e);
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("Reconnected to broker");
                        if let Err(e) = subscribe_all(&client, &topics) {
                            tracing::error!("{:#}", e);
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) if disconnecting => {
                        tracing::debug!("Connection closed: {}", e);
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Bus connection error: {}", e);
                        tokio::select! {
                            _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                            _ = cancel.cancelled() => break,
                        }
                    }
                }
            }
            _ = cancel.cancelled(), if !disconnecting => {
                tracing::info!("Disconnecting from broker");
                disconnecting = true;
                if let Err(e) = client.try_disconnect() {
                    tracing::warn!("Failed to request disconnect: {}", e);
                    break;
                }
            }
        }
    }
}

/// Publishes dispatched actions to their routed topic
async fn run_publisher(
    client: AsyncClient,
    routes: BTreeMap<String, String>,
    mut rx: mpsc::Receiver<Action>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            Some(action) = rx.recv() => {
                let Some(topic) = topic_for(&routes, &action) else {
                    tracing::warn!("No route for {}", action.action_type);
                    continue;
                };
                let payload = match serde_json::to_vec(&action) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!("Failed to encode {}: {}", action.action_type, e);
                        continue;
                    }
                };
                if let Err(e) = client.publish(topic, QoS::AtLeastOnce, false, payload).await {
                    tracing::error!("Failed to publish {}: {}", action.action_type, e);
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

fn topic_for<'a>(routes: &'a BTreeMap<String, String>, action: &Action) -> Option<&'a str> {
    let handle = action.route_handle()?;
    routes.get(handle).map(String::as_str)
}

/// Split `tcp://host:port`, `mqtt://host:port` or `host:port` into parts
fn parse_broker_uri(uri: &str) -> Result<(String, u16)> {
    let authority = match uri.split_once("://") {
        Some(("tcp" | "mqtt", rest)) => rest,
        Some((scheme, _)) => bail!("Unsupported broker scheme: {}", scheme),
        None => uri,
    };
    let authority = authority.trim_end_matches('/');

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) if !authority.ends_with(']') => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid broker port in {}", uri))?;
            (host, port)
        }
        _ => (authority, DEFAULT_PORT),
    };

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        bail!("Missing broker host in {}", uri);
    }

    Ok((host.to_string(), port))
}
