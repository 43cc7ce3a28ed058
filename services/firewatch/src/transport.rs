//! Telemetry transport: broker connection feeding the session channel
//!
//! A [`Transport`] owns the broker connection for the lifetime of a session.
//! Everything it observes is pushed, in arrival order, into a single
//! `mpsc` channel drained by the session consumer.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::BrokerConfig;
use crate::error::TransportError;

/// Pending client requests buffered by rumqttc
const REQUEST_CAPACITY: usize = 10;

/// How long a clean DISCONNECT is given on shutdown
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// Something the transport observed
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker accepted the session; the subscription has been issued
    Connected,
    /// One inbound publish
    Message { topic: String, payload: Vec<u8> },
    /// Connection attempt or live connection failed; a retry follows
    Error(TransportError),
}

/// Source of telemetry messages
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Where this transport connects to, for logs
    fn describe(&self) -> String;

    /// Run until `cancel` fires, pushing events into `sink`.
    ///
    /// Must not return early on connection failure: failures are reported
    /// as [`TransportEvent::Error`] and retried.
    async fn run(&self, sink: mpsc::Sender<TransportEvent>, cancel: CancellationToken);
}

/// Wire protocol selected by the broker URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerScheme {
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl BrokerScheme {
    fn default_port(self) -> u16 {
        match self {
            BrokerScheme::Tcp => 1883,
            BrokerScheme::Tls => 8883,
            BrokerScheme::Ws => 80,
            BrokerScheme::Wss => 443,
        }
    }
}

/// Parsed broker address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub scheme: BrokerScheme,
    pub host: String,
    pub port: u16,
    pub url: String,
}

/// Parse `mqtt://`, `mqtts://`, `ws://` or `wss://` broker URLs
pub fn parse_broker_url(raw: &str) -> Result<BrokerEndpoint, TransportError> {
    let invalid = |reason: String| TransportError::InvalidBrokerUrl {
        url: raw.to_string(),
        reason,
    };

    let url = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "mqtt" | "tcp" => BrokerScheme::Tcp,
        "mqtts" | "ssl" => BrokerScheme::Tls,
        "ws" => BrokerScheme::Ws,
        "wss" => BrokerScheme::Wss,
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    };
    let host = url
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?
        .to_string();
    let port = url.port().unwrap_or_else(|| scheme.default_port());

    Ok(BrokerEndpoint {
        scheme,
        host,
        port,
        url: raw.to_string(),
    })
}

/// Build rumqttc options for an endpoint
pub fn mqtt_options(
    config: &BrokerConfig,
    endpoint: &BrokerEndpoint,
    client_id: &str,
) -> MqttOptions {
    // Websocket transports take the full URL in place of the host.
    let host = match endpoint.scheme {
        BrokerScheme::Ws | BrokerScheme::Wss => endpoint.url.clone(),
        BrokerScheme::Tcp | BrokerScheme::Tls => endpoint.host.clone(),
    };

    let mut options = MqttOptions::new(client_id, host, endpoint.port);
    options.set_keep_alive(config.keep_alive);
    if !config.username.is_empty() {
        options.set_credentials(
            config.username.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }

    match endpoint.scheme {
        BrokerScheme::Tcp => {}
        BrokerScheme::Tls => {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        BrokerScheme::Ws => {
            options.set_transport(rumqttc::Transport::Ws);
        }
        BrokerScheme::Wss => {
            options.set_transport(rumqttc::Transport::wss_with_default_config());
        }
    }

    options
}

/// Map a rumqttc event to what the session cares about
pub fn translate(event: &Event) -> Option<TransportEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => Some(TransportEvent::Connected),
        Event::Incoming(Packet::Publish(publish)) => Some(TransportEvent::Message {
            topic: publish.topic.clone(),
            payload: publish.payload.to_vec(),
        }),
        _ => None,
    }
}

/// MQTT transport with fixed-interval, unbounded reconnect
pub struct MqttTransport {
    options: MqttOptions,
    endpoint: BrokerEndpoint,
    topic: String,
    reconnect_interval: Duration,
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("url", &self.endpoint.url)
            .field("topic", &self.topic)
            .field("reconnect_interval", &self.reconnect_interval)
            .finish()
    }
}

impl MqttTransport {
    pub fn new(config: &BrokerConfig) -> Result<Self, TransportError> {
        let endpoint = parse_broker_url(&config.url)?;
        let client_id = format!(
            "{}-{}",
            config.client_id_prefix,
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let options = mqtt_options(config, &endpoint, &client_id);

        tracing::debug!(
            "Created MqttTransport for {} as '{}' on topic '{}'",
            endpoint.url,
            client_id,
            config.topic
        );

        Ok(Self {
            options,
            endpoint,
            topic: config.topic.clone(),
            reconnect_interval: config.reconnect_interval,
        })
    }

    fn subscribe(&self, client: &AsyncClient) -> Option<TransportEvent> {
        match client.try_subscribe(self.topic.as_str(), QoS::AtMostOnce) {
            Ok(()) => {
                tracing::info!("Subscribed to '{}'", self.topic);
                None
            }
            Err(e) => Some(TransportEvent::Error(TransportError::Subscribe {
                topic: self.topic.clone(),
                reason: e.to_string(),
            })),
        }
    }

    async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
        if client.try_disconnect().is_err() {
            return;
        }
        // The DISCONNECT packet only leaves when the event loop is polled.
        let _ = tokio::time::timeout(DISCONNECT_GRACE, eventloop.poll()).await;
    }
}

/// Send unless the session is shutting down. Returns false when the
/// transport should stop.
async fn forward(
    sink: &mpsc::Sender<TransportEvent>,
    event: TransportEvent,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = sink.send(event) => sent.is_ok(),
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn describe(&self) -> String {
        format!("{} ({})", self.endpoint.url, self.topic)
    }

    async fn run(&self, sink: mpsc::Sender<TransportEvent>, cancel: CancellationToken) {
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        let mut connected = false;

        tracing::info!("Connecting to broker {}", self.endpoint.url);

        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                polled = eventloop.poll() => polled,
            };

            match polled {
                Ok(event) => {
                    let Some(translated) = translate(&event) else {
                        continue;
                    };

                    if translated == TransportEvent::Connected {
                        connected = true;
                        tracing::info!("Connected to broker {}", self.endpoint.url);
                        if !forward(&sink, translated, &cancel).await {
                            break;
                        }
                        if let Some(failure) = self.subscribe(&client) {
                            tracing::warn!("Subscription failed on {}", self.endpoint.url);
                            if !forward(&sink, failure, &cancel).await {
                                break;
                            }
                        }
                        continue;
                    }

                    if !forward(&sink, translated, &cancel).await {
                        break;
                    }
                }
                Err(e) => {
                    connected = false;
                    tracing::warn!(
                        "Broker connection error on {}: {}. Retrying in {:?}",
                        self.endpoint.url,
                        e,
                        self.reconnect_interval
                    );
                    let failure = TransportEvent::Error(TransportError::Connection(e.to_string()));
                    if !forward(&sink, failure, &cancel).await {
                        break;
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.reconnect_interval) => {}
                    }
                }
            }
        }

        if connected {
            Self::disconnect(&client, &mut eventloop).await;
        }
        tracing::debug!("Transport for {} stopped", self.endpoint.url);
    }
}
