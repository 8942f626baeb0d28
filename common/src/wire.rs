use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet type: {0:?}")]
    UnknownType(char),
    #[error("binary packets are not supported")]
    Binary,
    #[error("malformed packet: {0}")]
    Malformed(String),
}

/// Handshake data sent by the server in the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 { 25_000 }
fn default_ping_timeout() -> u64 { 20_000 }

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn parse(frame: &str) -> Result<Self, WireError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(WireError::Empty)?;
        let rest = chars.as_str();
        match kind {
            '0' => serde_json::from_str(rest)
                .map(EnginePacket::Open)
                .map_err(|e| WireError::Malformed(format!("open handshake: {}", e))),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => Ok(EnginePacket::Message(rest.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            'b' => Err(WireError::Binary),
            other => Err(WireError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            // Clients never send an open packet; encode it for completeness.
            EnginePacket::Open(info) => format!(
                "0{{\"sid\":{},\"pingInterval\":{},\"pingTimeout\":{}}}",
                Value::String(info.sid.clone()),
                info.ping_interval,
                info.ping_timeout
            ),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect { namespace: String, data: Option<Value> },
    Disconnect { namespace: String },
    Event { namespace: String, id: Option<u64>, name: String, args: Vec<Value> },
    Ack { namespace: String, id: u64, args: Vec<Value> },
    ConnectError { namespace: String, data: Value },
}

impl SocketPacket {
    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    pub fn parse(payload: &str) -> Result<Self, WireError> {
        let mut chars = payload.chars();
        let kind = chars.next().ok_or(WireError::Empty)?;
        if kind == '5' || kind == '6' {
            return Err(WireError::Binary);
        }
        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            let (ns, tail) = match rest.find(',') {
                Some(idx) => (&rest[..idx], &rest[idx + 1..]),
                None => (rest, ""),
            };
            rest = tail;
            ns.to_string()
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| WireError::Malformed(format!("ack id: {}", e)))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest).map_err(|e| WireError::Malformed(e.to_string()))?)
        };

        match kind {
            '0' => Ok(SocketPacket::Connect { namespace, data }),
            '1' => Ok(SocketPacket::Disconnect { namespace }),
            '2' => {
                let mut args = match data {
                    Some(Value::Array(args)) => args,
                    _ => return Err(WireError::Malformed("event without argument array".to_string())),
                };
                if args.is_empty() {
                    return Err(WireError::Malformed("event without a name".to_string()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => return Err(WireError::Malformed(format!("event name is not a string: {}", other))),
                };
                Ok(SocketPacket::Event { namespace, id, name, args })
            }
            '3' => {
                let id = id.ok_or_else(|| WireError::Malformed("ack without id".to_string()))?;
                let args = match data {
                    Some(Value::Array(args)) => args,
                    None => Vec::new(),
                    Some(other) => vec![other],
                };
                Ok(SocketPacket::Ack { namespace, id, args })
            }
            '4' => Ok(SocketPacket::ConnectError { namespace, data: data.unwrap_or(Value::Null) }),
            other => Err(WireError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> String {
        let ns_prefix = |ns: &str| {
            if ns == DEFAULT_NAMESPACE {
                String::new()
            } else {
                format!("{},", ns)
            }
        };
        match self {
            SocketPacket::Connect { namespace, data } => {
                let body = data.as_ref().map(Value::to_string).unwrap_or_default();
                format!("0{}{}", ns_prefix(namespace), body)
            }
            SocketPacket::Disconnect { namespace } => format!("1{}", ns_prefix(namespace)),
            SocketPacket::Event { namespace, id, name, args } => {
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(Value::String(name.clone()));
                all.extend(args.iter().cloned());
                let id = id.map(|id| id.to_string()).unwrap_or_default();
                format!("2{}{}{}", ns_prefix(namespace), id, Value::Array(all))
            }
            SocketPacket::Ack { namespace, id, args } => {
                format!("3{}{}{}", ns_prefix(namespace), id, Value::Array(args.clone()))
            }
            SocketPacket::ConnectError { namespace, data } => format!("4{}{}", ns_prefix(namespace), data),
        }
    }

    /// Full WebSocket text frame: Engine.IO message wrapping this packet.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_open_handshake() {
        let packet = EnginePacket::parse(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#,
        )
        .unwrap();
        assert_eq!(
            packet,
            EnginePacket::Open(OpenInfo {
                sid: "lv_VI97HAXpY6yYWAAAC".to_string(),
                upgrades: vec![],
                ping_interval: 25000,
                ping_timeout: 5000,
            })
        );
    }

    #[test]
    fn ping_pong_and_message() {
        assert_eq!(EnginePacket::parse("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::parse("3upgrade-check").unwrap(), EnginePacket::Pong("upgrade-check".to_string()));
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert_eq!(EnginePacket::parse("440").unwrap(), EnginePacket::Message("40".to_string()));
        assert_eq!(EnginePacket::parse(""), Err(WireError::Empty));
        assert_eq!(EnginePacket::parse("bAQID"), Err(WireError::Binary));
        assert_eq!(EnginePacket::parse("x"), Err(WireError::UnknownType('x')));
    }

    #[test]
    fn parses_event_with_payload() {
        let packet = SocketPacket::parse(r#"2["cea-worker-success",{"id":3,"state":2}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/".to_string(),
                id: None,
                name: "cea-worker-success".to_string(),
                args: vec![json!({"id": 3, "state": 2})],
            }
        );
    }

    #[test]
    fn parses_namespaced_event_with_ack_id() {
        let packet = SocketPacket::parse(r#"2/jobs,12["worker-started",{"id":1}]"#).unwrap();
        match packet {
            SocketPacket::Event { namespace, id, name, args } => {
                assert_eq!(namespace, "/jobs");
                assert_eq!(id, Some(12));
                assert_eq!(name, "worker-started");
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn parses_connect_variants() {
        assert_eq!(
            SocketPacket::parse("0").unwrap(),
            SocketPacket::Connect { namespace: "/".to_string(), data: None }
        );
        assert_eq!(
            SocketPacket::parse(r#"0{"sid":"abc"}"#).unwrap(),
            SocketPacket::Connect { namespace: "/".to_string(), data: Some(json!({"sid": "abc"})) }
        );
        assert_eq!(
            SocketPacket::parse("0/admin,").unwrap(),
            SocketPacket::Connect { namespace: "/admin".to_string(), data: None }
        );
        assert_eq!(
            SocketPacket::parse(r#"4{"message":"Not authorized"}"#).unwrap(),
            SocketPacket::ConnectError { namespace: "/".to_string(), data: json!({"message": "Not authorized"}) }
        );
    }

    #[test]
    fn rejects_malformed_events() {
        assert!(matches!(SocketPacket::parse("2{}"), Err(WireError::Malformed(_))));
        assert!(matches!(SocketPacket::parse("2[]"), Err(WireError::Malformed(_))));
        assert!(matches!(SocketPacket::parse("2[1]"), Err(WireError::Malformed(_))));
        assert_eq!(SocketPacket::parse(r#"51-["x",{"_placeholder":true,"num":0}]"#), Err(WireError::Binary));
    }

    #[test]
    fn encodes_client_frames() {
        let connect = SocketPacket::Connect { namespace: "/".to_string(), data: None };
        assert_eq!(connect.to_frame(), "40");
        let connect = SocketPacket::Connect { namespace: "/jobs".to_string(), data: None };
        assert_eq!(connect.to_frame(), "40/jobs,");
        let ack = SocketPacket::Ack { namespace: "/".to_string(), id: 7, args: vec![] };
        assert_eq!(ack.to_frame(), "437[]");
    }
}
