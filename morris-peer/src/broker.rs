//! 对端消息中转
//!
//! 把 [`PeerState`] 接到一条传输连接上：发出的消息封装成带校验前缀的帧，
//! 收到的帧校验后交给状态处理，不同步时先通知对方再发起重同步。

use anyhow::{Context, Result};
use morris_protocol::{CellId, Connection, Move, PeerFrame, PeerMessage};
use tracing::{debug, warn};

use crate::peer::PeerState;

/// 对端中转
pub struct PeerBroker<C: Connection> {
    conn: C,
    peer: PeerState,
}

impl<C: Connection> PeerBroker<C> {
    pub fn new(conn: C, peer: PeerState) -> Self {
        Self { conn, peer }
    }

    pub fn peer(&self) -> &PeerState {
        &self.peer
    }

    pub fn into_peer(self) -> PeerState {
        self.peer
    }

    /// 封装并发送一条消息
    pub async fn send(&mut self, msg: &PeerMessage) -> Result<()> {
        let sealed = msg
            .seal(self.peer.crypto().as_ref(), self.peer.me())
            .context("封装消息失败")?;
        self.conn.send(&PeerFrame::new(self.peer.me(), sealed.into_bytes())).await?;
        debug!(command = %msg.command, "消息已发送");
        Ok(())
    }

    async fn send_all(&mut self, messages: Vec<PeerMessage>) -> Result<()> {
        for msg in &messages {
            self.send(msg).await?;
        }
        Ok(())
    }

    /// 按角色发出第一条消息
    pub async fn open(&mut self) -> Result<()> {
        if let Some(msg) = self.peer.open()? {
            self.send(&msg).await?;
        }
        Ok(())
    }

    /// 提交本地走法
    pub async fn play(&mut self, mv: &Move) -> Result<()> {
        let messages = self.peer.submit_move(mv)?;
        self.send_all(messages).await
    }

    /// 本地点击格点，返回是否产生了走法
    pub async fn click(&mut self, cell: CellId) -> Result<bool> {
        let messages = self.peer.click_cell(cell)?;
        let moved = !messages.is_empty();
        self.send_all(messages).await?;
        Ok(moved)
    }

    /// 接收并处理一帧
    ///
    /// 无法校验的帧直接丢弃，返回 `Ok(None)`；不同步时发出拒绝通知和重同步请求。
    pub async fn poll(&mut self) -> Result<Option<PeerMessage>> {
        let frame = self.conn.recv().await?;
        if frame.from != self.peer.them() {
            debug!(from = %frame.from, "忽略来自未知对端的帧");
            return Ok(None);
        }

        let Some(msg) = PeerMessage::open(&frame.data, self.peer.crypto().as_ref(), &frame.from) else {
            debug!(from = %frame.from, len = frame.data.len(), "丢弃无法校验的帧");
            return Ok(None);
        };
        debug!(command = %msg.command, "收到消息");

        match self.peer.handle_message(&msg) {
            Ok(Some(reply)) => self.send(&reply).await?,
            Ok(None) => {}
            Err(e) if e.needs_resync() => {
                warn!(command = %msg.command, error = %e, "同步失败，请求重同步");
                let notice = self.peer.rejection_notice(&e);
                self.send(&notice).await?;
                let request = self.peer.request_resync()?;
                self.send(&request).await?;
            }
            Err(e) => return Err(e).context("处理对端消息失败"),
        }
        Ok(Some(msg))
    }

    /// 换上新的连接并按角色恢复同步
    pub async fn reconnect(&mut self, conn: C) -> Result<()> {
        self.peer.mark_disconnected();
        self.conn = conn;
        if let Some(msg) = self.peer.mark_reconnected()? {
            self.send(&msg).await?;
        }
        Ok(())
    }

    /// 关闭连接
    pub async fn close(&mut self) -> Result<()> {
        self.conn.close().await?;
        self.peer.mark_disconnected();
        Ok(())
    }
}
