//! 传输层
//!
//! 连接只负责按发送顺序投递 [`PeerFrame`]，不理解其中的内容。
//! 流式传输上每一帧为 `[版本 u8][长度 u32 BE][bincode(PeerFrame)]`。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::error::{ProtocolError, Result};
use crate::{CONNECT_TIMEOUT, MAX_FRAME_SIZE, PROTOCOL_VERSION};

/// 传输方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// TCP 直连
    Tcp,
    /// 进程内通道
    Memory,
}

/// 网络配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub transport: TransportType,
    pub host: String,
    pub port: u16,
}

impl NetworkConfig {
    /// `host:port` 形式的地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transport: TransportType::Tcp,
            host: "127.0.0.1".to_string(),
            port: 9527,
        }
    }
}

/// 传输帧：发送方 ID + 不透明数据
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerFrame {
    pub from: String,
    pub data: Vec<u8>,
}

impl PeerFrame {
    pub fn new(from: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            from: from.into(),
            data: data.into(),
        }
    }
}

/// 双向连接
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&mut self, frame: &PeerFrame) -> Result<()>;

    /// 等待下一帧，对方关闭时返回 [`ProtocolError::ConnectionClosed`]
    async fn recv(&mut self) -> Result<PeerFrame>;

    async fn close(&mut self) -> Result<()>;

    /// 远端描述，仅用于日志
    fn peer_addr(&self) -> Option<String>;
}

/// 发起方
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn>;
}

/// 等待方
#[async_trait]
pub trait Listener: Send + Sync + Sized {
    type Conn: Connection;

    async fn bind(addr: &str) -> Result<Self>;

    async fn accept(&mut self) -> Result<Self::Conn>;

    fn local_addr(&self) -> Option<String>;
}

// ============================================================================
// 帧编解码
// ============================================================================

/// 帧头：1 字节版本 + 4 字节长度
const HEADER_SIZE: usize = 5;

/// 编码一帧（含帧头）
pub fn encode_frame(frame: &PeerFrame) -> Result<Vec<u8>> {
    let body = bincode::serialize(frame)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// 校验帧头，返回消息体长度
fn parse_header(header: &[u8; HEADER_SIZE]) -> Result<usize> {
    let [version, len @ ..] = *header;
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            actual: version,
        });
    }

    let size = u32::from_be_bytes(len) as usize;
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(size)
}

fn eof_as_closed(e: std::io::Error) -> ProtocolError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset => ProtocolError::ConnectionClosed,
        _ => ProtocolError::Io(e),
    }
}

/// 任意字节流上的分帧连接
pub struct StreamConnection<S> {
    stream: S,
    buffer: Vec<u8>,
    peer_addr: Option<String>,
}

impl<S> StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(stream: S, peer_addr: Option<String>) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            peer_addr,
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> Connection for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn send(&mut self, frame: &PeerFrame) -> Result<()> {
        let bytes = encode_frame(frame)?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<PeerFrame> {
        let mut header = [0u8; HEADER_SIZE];
        self.stream.read_exact(&mut header).await.map_err(eof_as_closed)?;
        let size = parse_header(&header)?;

        self.buffer.resize(size, 0);
        self.stream.read_exact(&mut self.buffer).await.map_err(eof_as_closed)?;
        Ok(bincode::deserialize(&self.buffer)?)
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await.map_err(eof_as_closed)
    }

    fn peer_addr(&self) -> Option<String> {
        self.peer_addr.clone()
    }
}

// ============================================================================
// TCP
// ============================================================================

/// TCP 连接
pub type TcpConnection = StreamConnection<TcpStream>;

impl TcpConnection {
    fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok().map(|a| a.to_string());
        Ok(Self::new(stream, peer_addr))
    }
}

/// TCP 发起方
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    pub timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            timeout: CONNECT_TIMEOUT,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn> {
        let stream = timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)??;
        TcpConnection::from_stream(stream)
    }
}

/// TCP 等待方
pub struct TcpListener {
    listener: tokio::net::TcpListener,
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpConnection;

    async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    async fn accept(&mut self) -> Result<Self::Conn> {
        let (stream, _) = self.listener.accept().await?;
        TcpConnection::from_stream(stream)
    }

    fn local_addr(&self) -> Option<String> {
        self.listener.local_addr().ok().map(|a| a.to_string())
    }
}

// ============================================================================
// 进程内通道
// ============================================================================

/// 进程内连接，成对创建
pub struct ChannelConnection {
    tx: Option<mpsc::UnboundedSender<PeerFrame>>,
    rx: mpsc::UnboundedReceiver<PeerFrame>,
    label: &'static str,
}

impl ChannelConnection {
    /// 创建一对互联的连接
    pub fn pair() -> (ChannelConnection, ChannelConnection) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a = ChannelConnection {
            tx: Some(a_tx),
            rx: a_rx,
            label: "memory:a",
        };
        let b = ChannelConnection {
            tx: Some(b_tx),
            rx: b_rx,
            label: "memory:b",
        };
        (a, b)
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    async fn send(&mut self, frame: &PeerFrame) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(frame.clone()).map_err(|_| ProtocolError::ConnectionClosed)
    }

    async fn recv(&mut self) -> Result<PeerFrame> {
        self.rx.recv().await.ok_or(ProtocolError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        // 丢弃发送端即通知对方
        self.tx = None;
        Ok(())
    }

    fn peer_addr(&self) -> Option<String> {
        Some(self.label.to_string())
    }
}
