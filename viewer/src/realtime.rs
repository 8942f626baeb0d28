use anyhow::{Context, Result};
use common::{EnginePacket, JobEvent, JobEventKind, SocketPacket, WireError};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::controller::ControllerHandle;

/// Read timeout used until the server tells us its ping schedule.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
// Upper bound for the server's pingInterval/pingTimeout, in ms
const MAX_PING_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct RealtimeOptions {
    pub url: Url,
    pub engine_io_version: u8,
    pub namespace: String,
    pub event_prefix: String,
    pub max_reconnect_delay: Duration,
}

impl RealtimeOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            url: config.realtime_url()?,
            engine_io_version: config.realtime.engine_io_version,
            namespace: config.realtime.namespace.clone(),
            event_prefix: config.realtime.event_prefix.clone(),
            max_reconnect_delay: Duration::from_secs(config.realtime.max_reconnect_delay_secs),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Send(String),
    Emit(JobEvent),
    Close,
    Fail(String),
}

#[derive(Debug)]
pub struct Session {
    engine_io_version: u8,
    namespace: String,
    event_prefix: String,
    joined: bool,
    ping_interval: Option<Duration>,
    ping_timeout: Option<Duration>,
}

impl Session {
    pub fn new(options: &RealtimeOptions) -> Self {
        Self {
            engine_io_version: options.engine_io_version,
            namespace: options.namespace.clone(),
            event_prefix: options.event_prefix.clone(),
            joined: false,
            ping_interval: None,
            ping_timeout: None,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn read_timeout(&self) -> Duration {
        match (self.ping_interval, self.ping_timeout) {
            (Some(interval), Some(timeout)) => interval.saturating_add(timeout),
            _ => HANDSHAKE_TIMEOUT,
        }
    }

    /// Engine.IO 3 expects the client to ping; 4 has the server do it.
    pub fn client_ping_interval(&self) -> Option<Duration> {
        if self.engine_io_version == 3 {
            self.ping_interval
        } else {
            None
        }
    }

    pub fn on_frame(&mut self, frame: &str) -> Result<Vec<Action>, WireError> {
        let actions = match EnginePacket::parse(frame)? {
            EnginePacket::Open(info) => {
                log::debug!("Engine.IO session {} open (ping every {}ms)", info.sid, info.ping_interval);
                check_ping_ms("pingInterval", info.ping_interval)?;
                check_ping_ms("pingTimeout", info.ping_timeout)?;
                self.ping_interval = Some(Duration::from_millis(info.ping_interval));
                self.ping_timeout = Some(Duration::from_millis(info.ping_timeout));
                // EIO3 servers join the default namespace on their own
                if self.engine_io_version >= 4 || self.namespace != common::wire::DEFAULT_NAMESPACE {
                    let connect = SocketPacket::Connect { namespace: self.namespace.clone(), data: None };
                    vec![Action::Send(connect.to_frame())]
                } else {
                    vec![]
                }
            }
            EnginePacket::Ping(data) => vec![Action::Send(EnginePacket::Pong(data).encode())],
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => vec![],
            EnginePacket::Close => vec![Action::Close],
            EnginePacket::Message(payload) => self.on_socket_packet(SocketPacket::parse(&payload)?),
        };
        Ok(actions)
    }

    fn on_socket_packet(&mut self, packet: SocketPacket) -> Vec<Action> {
        if packet.namespace() != self.namespace {
            log::debug!("Ignoring packet for namespace {}", packet.namespace());
            return vec![];
        }

        match packet {
            SocketPacket::Connect { .. } => {
                self.joined = true;
                log::info!("Subscribed to job events on namespace {}", self.namespace);
                vec![]
            }
            SocketPacket::ConnectError { data, .. } => {
                vec![Action::Fail(format!("Server refused namespace {}: {}", self.namespace, data))]
            }
            SocketPacket::Disconnect { .. } => {
                self.joined = false;
                vec![Action::Close]
            }
            SocketPacket::Event { namespace, id, name, args } => {
                let mut actions = Vec::new();
                match JobEventKind::from_event_name(&name, &self.event_prefix) {
                    Some(kind) => {
                        let payload = args.into_iter().next().unwrap_or(Value::Null);
                        actions.push(Action::Emit(JobEvent { kind, payload }));
                    }
                    None => log::debug!("Ignoring event {}", name),
                }
                if let Some(id) = id {
                    let ack = SocketPacket::Ack { namespace, id, args: vec![] };
                    actions.push(Action::Send(ack.to_frame()));
                }
                actions
            }
            SocketPacket::Ack { .. } => vec![],
        }
    }
}

fn check_ping_ms(field: &str, ms: u64) -> Result<(), WireError> {
    if ms == 0 || ms > MAX_PING_MS {
        return Err(WireError::Malformed(format!("{} of {}ms is out of range", field, ms)));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closed {
    ByServer,
    Shutdown,
    ControllerGone,
}

pub fn spawn_subscriber(
    options: RealtimeOptions,
    handle: ControllerHandle,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("Connecting to job events at {}", options.url);
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match connect_and_listen(&options, &handle, &shutdown).await {
                Ok(Closed::ByServer) => {
                    log::info!("Job event connection closed");
                    backoff = INITIAL_BACKOFF;
                }
                Ok(Closed::Shutdown) => break,
                Ok(Closed::ControllerGone) => {
                    log::info!("Job table controller gone, dropping job event subscription");
                    break;
                }
                Err(e) => {
                    log::warn!("Job event connection failed (retrying in {}s): {:#}", backoff.as_secs(), e);
                }
            }

            if shutdown.is_cancelled() {
                break;
            }

            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(backoff + jitter) => {}
            }
            backoff = (backoff * 2).min(options.max_reconnect_delay.max(INITIAL_BACKOFF));
        }
    })
}

async fn connect_and_listen(
    options: &RealtimeOptions,
    handle: &ControllerHandle,
    shutdown: &CancellationToken,
) -> Result<Closed> {
    let (ws_stream, _) = connect_async(options.url.as_str())
        .await
        .with_context(|| format!("WebSocket connect to {} failed", options.url))?;
    let (mut sink, mut stream) = ws_stream.split();

    let mut session = Session::new(options);
    let mut heartbeat: Option<Interval> = None;

    loop {
        let read_timeout = session.read_timeout();
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(Message::Text(EnginePacket::Close.encode().into())).await;
                return Ok(Closed::Shutdown);
            }
            _ = tick(&mut heartbeat) => {
                sink.send(Message::Text(EnginePacket::Ping(String::new()).encode().into()))
                    .await
                    .context("Failed to send heartbeat")?;
            }
            next = tokio::time::timeout(read_timeout, stream.next()) => {
                let message = match next {
                    Ok(Some(message)) => message.context("WebSocket read failed")?,
                    Ok(None) => return Ok(Closed::ByServer),
                    Err(_) => anyhow::bail!("No traffic from server for {}s", read_timeout.as_secs()),
                };

                let text = match message {
                    Message::Text(text) => text,
                    Message::Close(_) => return Ok(Closed::ByServer),
                    _ => continue,
                };

                let actions = match session.on_frame(text.as_str()) {
                    Ok(actions) => actions,
                    Err(e) => {
                        log::warn!("Ignoring unreadable frame {:?}: {}", text.as_str(), e);
                        continue;
                    }
                };

                if heartbeat.is_none() {
                    if let Some(period) = session.client_ping_interval().filter(|p| !p.is_zero()) {
                        let now = tokio::time::Instant::now();
                        let start = now.checked_add(period).unwrap_or(now);
                        heartbeat = Some(tokio::time::interval_at(start, period));
                    }
                }

                for action in actions {
                    match action {
                        Action::Send(frame) => {
                            sink.send(Message::Text(frame.into())).await.context("WebSocket write failed")?;
                        }
                        Action::Emit(event) => {
                            if !handle.notify(event) {
                                return Ok(Closed::ControllerGone);
                            }
                        }
                        Action::Close => return Ok(Closed::ByServer),
                        Action::Fail(reason) => anyhow::bail!(reason),
                    }
                }
            }
        }
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(version: u8, namespace: &str, prefix: &str) -> RealtimeOptions {
        RealtimeOptions {
            url: Url::parse("ws://localhost:5050/socket.io/?EIO=4&transport=websocket").unwrap(),
            engine_io_version: version,
            namespace: namespace.to_string(),
            event_prefix: prefix.to_string(),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }

    const OPEN: &str = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    #[test]
    fn v4_handshake_joins_namespace() {
        let mut session = Session::new(&options(4, "/", ""));
        assert_eq!(session.read_timeout(), HANDSHAKE_TIMEOUT);

        let actions = session.on_frame(OPEN).unwrap();
        assert_eq!(actions, vec![Action::Send("40".to_string())]);
        assert_eq!(session.read_timeout(), Duration::from_secs(45));
        assert_eq!(session.client_ping_interval(), None);

        assert!(session.on_frame(r#"40{"sid":"xyz"}"#).unwrap().is_empty());
        assert!(session.is_joined());
    }

    #[test]
    fn v3_default_namespace_is_implicit_and_client_pings() {
        let mut session = Session::new(&options(3, "/", ""));
        assert!(session.on_frame(OPEN).unwrap().is_empty());
        assert_eq!(session.client_ping_interval(), Some(Duration::from_secs(25)));
        assert!(session.on_frame("3").unwrap().is_empty());
    }

    #[test]
    fn rejects_zero_or_huge_ping_interval() {
        let mut session = Session::new(&options(3, "/", ""));
        let err = session.on_frame(r#"0{"sid":"x","pingInterval":0,"pingTimeout":5000}"#).unwrap_err();
        assert!(matches!(err, WireError::Malformed(_)));
        assert_eq!(session.client_ping_interval(), None);
        assert_eq!(session.read_timeout(), HANDSHAKE_TIMEOUT);

        let huge = format!(r#"0{{"sid":"x","pingInterval":25000,"pingTimeout":{}}}"#, u64::MAX);
        assert!(session.on_frame(&huge).is_err());
        assert_eq!(session.read_timeout(), HANDSHAKE_TIMEOUT);
    }

    #[test]
    fn answers_server_ping() {
        let mut session = Session::new(&options(4, "/", ""));
        assert_eq!(session.on_frame("2").unwrap(), vec![Action::Send("3".to_string())]);
    }

    #[test]
    fn emits_worker_events_and_ignores_others() {
        let mut session = Session::new(&options(4, "/", "cea-"));
        session.on_frame(OPEN).unwrap();
        session.on_frame("40").unwrap();

        let actions = session
            .on_frame(r#"42["cea-worker-success",{"id":3,"script":"demand","state":2}]"#)
            .unwrap();
        assert_eq!(
            actions,
            vec![Action::Emit(JobEvent {
                kind: JobEventKind::Success,
                payload: json!({"id": 3, "script": "demand", "state": 2}),
            })]
        );

        assert!(session.on_frame(r#"42["cea-stream",{"id":3}]"#).unwrap().is_empty());
        assert!(session.on_frame(r#"42["worker-success",{"id":3}]"#).unwrap().is_empty());
    }

    #[test]
    fn acknowledges_events_that_ask_for_it() {
        let mut session = Session::new(&options(4, "/", ""));
        let actions = session.on_frame(r#"425["worker-started"]"#).unwrap();
        assert_eq!(
            actions,
            vec![
                Action::Emit(JobEvent { kind: JobEventKind::Started, payload: Value::Null }),
                Action::Send("435[]".to_string()),
            ]
        );
    }

    #[test]
    fn custom_namespace_filters_packets() {
        let mut session = Session::new(&options(3, "/jobs", ""));
        assert_eq!(session.on_frame(OPEN).unwrap(), vec![Action::Send("40/jobs,".to_string())]);
        assert!(session.on_frame(r#"42["worker-error",{}]"#).unwrap().is_empty());
        assert_eq!(session.on_frame(r#"42/jobs,["worker-error",{}]"#).unwrap().len(), 1);
    }

    #[test]
    fn connect_error_and_close() {
        let mut session = Session::new(&options(4, "/", ""));
        assert!(matches!(
            session.on_frame(r#"44{"message":"nope"}"#).unwrap().as_slice(),
            [Action::Fail(_)]
        ));
        assert_eq!(session.on_frame("41").unwrap(), vec![Action::Close]);
        assert_eq!(session.on_frame("1").unwrap(), vec![Action::Close]);
        assert!(session.on_frame("4").is_err());
    }
}
