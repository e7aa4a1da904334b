//! Syslog sink
//!
//! Sends `<134>{tag}: {json}\n` frames (LOCAL0 facility, INFO severity) over
//! TCP or UDP. A broken TCP connection is re-established on the next send.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tracing::warn;

use super::{EventSerializer, SerializerConfig, Sink};
use crate::error::SinkError;
use crate::event::Event;

/// LOCAL0 (16) * 8 + INFO (6)
const PRIORITY: u8 = 134;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyslogConfig {
    pub network: Network,
    /// `host:port` of the syslog server.
    pub addr: String,
    pub tag: String,
    #[serde(flatten)]
    pub serializer: SerializerConfig,
}

enum Transport {
    Tcp(Mutex<Option<TcpStream>>),
    Udp(UdpSocket),
}

pub struct SyslogSink {
    transport: Transport,
    addr: String,
    tag: String,
    serializer: EventSerializer,
}

impl SyslogSink {
    pub async fn connect(config: SyslogConfig) -> Result<Self, SinkError> {
        if config.addr.is_empty() {
            return Err(SinkError::Init("syslog sink requires an addr".to_string()));
        }

        let transport = match config.network {
            Network::Tcp => {
                let stream = TcpStream::connect(&config.addr)
                    .await
                    .map_err(|e| SinkError::Init(format!("cannot reach {}: {}", config.addr, e)))?;
                Transport::Tcp(Mutex::new(Some(stream)))
            }
            Network::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0")
                    .await
                    .map_err(|e| SinkError::Init(format!("cannot bind UDP socket: {e}")))?;
                socket
                    .connect(&config.addr)
                    .await
                    .map_err(|e| SinkError::Init(format!("cannot reach {}: {}", config.addr, e)))?;
                Transport::Udp(socket)
            }
        };

        Ok(Self {
            transport,
            addr: config.addr,
            tag: if config.tag.is_empty() {
                "kubesee".to_string()
            } else {
                config.tag
            },
            serializer: EventSerializer::new(config.serializer),
        })
    }

    fn frame(&self, json: &[u8]) -> Vec<u8> {
        let mut frame = format!("<{PRIORITY}>{}: ", self.tag).into_bytes();
        frame.extend_from_slice(json);
        frame.push(b'\n');
        frame
    }
}

#[async_trait]
impl Sink for SyslogSink {
    async fn send(&self, event: &Event) -> Result<(), SinkError> {
        let frame = self.frame(&self.serializer.serialize(event)?);

        match &self.transport {
            Transport::Tcp(stream) => {
                let mut guard = stream.lock().await;
                if guard.is_none() {
                    warn!(addr = %self.addr, "reconnecting syslog stream");
                    let reconnected = TcpStream::connect(&self.addr)
                        .await
                        .map_err(|e| SinkError::Connection(e.to_string()))?;
                    *guard = Some(reconnected);
                }
                // Checked or re-established just above.
                if let Some(tcp) = guard.as_mut() {
                    if let Err(e) = tcp.write_all(&frame).await {
                        guard.take();
                        return Err(SinkError::Send(e.to_string()));
                    }
                }
                Ok(())
            }
            Transport::Udp(socket) => {
                socket
                    .send(&frame)
                    .await
                    .map_err(|e| SinkError::Send(e.to_string()))?;
                Ok(())
            }
        }
    }

    async fn close(&self) {
        if let Transport::Tcp(stream) = &self.transport {
            if let Some(mut tcp) = stream.lock().await.take() {
                let _ = tcp.shutdown().await;
            }
        }
    }
}
