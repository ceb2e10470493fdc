//! 对端消息定义
//!
//! 每条消息都绑定发送前后的状态指纹。传输上支持两种帧格式：
//! - 冒号分隔：`command:priorHash:newHash:payload`，载荷可以包含冒号
//! - 指纹前缀：64 位十六进制校验前缀 + JSON 消息体

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::DIGEST_HEX_LEN;
use crate::hash::{fingerprint, Crypto};

/// 对端命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeerCommand {
    /// 主机发起握手
    Helo,
    /// 客户端应答握手
    Ehlo,
    /// 邀请对局
    PlayWithMe,
    /// 接受邀请
    IWillPlayWithYou,
    /// 拒绝邀请
    IWontPlayWithYou,
    /// 走法
    Move,
    /// 对局结束通知
    GameOver,
    /// 请求完整快照
    ResyncRequest,
    /// 完整快照
    ResyncResponse,
    /// 通知对方：其消息的指纹与本地链条接不上
    HashMismatch,
    /// 通知对方：其消息被拒绝
    Error,
}

impl PeerCommand {
    /// 所有命令
    pub const ALL: [PeerCommand; 11] = [
        PeerCommand::Helo,
        PeerCommand::Ehlo,
        PeerCommand::PlayWithMe,
        PeerCommand::IWillPlayWithYou,
        PeerCommand::IWontPlayWithYou,
        PeerCommand::Move,
        PeerCommand::GameOver,
        PeerCommand::ResyncRequest,
        PeerCommand::ResyncResponse,
        PeerCommand::HashMismatch,
        PeerCommand::Error,
    ];

    /// 线上名称
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerCommand::Helo => "HELO",
            PeerCommand::Ehlo => "EHLO",
            PeerCommand::PlayWithMe => "PLAY_WITH_ME",
            PeerCommand::IWillPlayWithYou => "I_WILL_PLAY_WITH_YOU",
            PeerCommand::IWontPlayWithYou => "I_WONT_PLAY_WITH_YOU",
            PeerCommand::Move => "MOVE",
            PeerCommand::GameOver => "GAME_OVER",
            PeerCommand::ResyncRequest => "RESYNC_REQUEST",
            PeerCommand::ResyncResponse => "RESYNC_RESPONSE",
            PeerCommand::HashMismatch => "HASH_MISMATCH",
            PeerCommand::Error => "ERROR",
        }
    }

    /// 从线上名称解析
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.as_str() == name)
    }

    /// 建立首次联系的握手命令
    pub fn is_handshake(&self) -> bool {
        matches!(self, PeerCommand::Helo | PeerCommand::Ehlo)
    }

    /// 重同步命令
    pub fn is_resync(&self) -> bool {
        matches!(self, PeerCommand::ResyncRequest | PeerCommand::ResyncResponse)
    }

    /// 拒绝通知：不进入指纹链，也不改变对局状态
    pub fn is_notice(&self) -> bool {
        matches!(self, PeerCommand::HashMismatch | PeerCommand::Error)
    }
}

impl fmt::Display for PeerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对端消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMessage {
    pub command: PeerCommand,
    /// 发送方发送前的状态指纹，仅首次握手可为空
    pub prior_state_hash: Option<String>,
    /// 发送后的状态指纹
    pub new_state_hash: String,
    pub payload: String,
}

impl PeerMessage {
    pub fn new(
        command: PeerCommand,
        prior_state_hash: Option<String>,
        new_state_hash: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            command,
            prior_state_hash,
            new_state_hash: new_state_hash.into(),
            payload: payload.into(),
        }
    }

    /// 编码为冒号分隔格式
    pub fn to_wire(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.command,
            self.prior_state_hash.as_deref().unwrap_or(""),
            self.new_state_hash,
            self.payload
        )
    }

    /// 解析冒号分隔格式，格式错误时返回 None
    pub fn from_wire(data: &str) -> Option<Self> {
        let mut fields = data.splitn(4, ':');
        let command = PeerCommand::from_name(fields.next()?)?;
        let prior = fields.next()?;
        let new = fields.next()?;
        let payload = fields.next()?;

        if new.is_empty() {
            return None;
        }

        Some(Self {
            command,
            prior_state_hash: (!prior.is_empty()).then(|| prior.to_string()),
            new_state_hash: new.to_string(),
            payload: payload.to_string(),
        })
    }

    /// 序列化为 JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 封装为带校验前缀的帧，前缀为 `fingerprint(blob + sender)`
    pub fn seal(&self, crypto: &dyn Crypto, sender: &str) -> Result<String, serde_json::Error> {
        let blob = self.to_json()?;
        let prefix = fingerprint(crypto, &format!("{}{}", blob, sender));
        Ok(format!("{}{}", prefix, blob))
    }

    /// 校验并解析带前缀的帧，任何结构问题都返回 None
    pub fn open(data: &[u8], crypto: &dyn Crypto, sender: &str) -> Option<Self> {
        let text = std::str::from_utf8(data).ok()?;
        if text.len() <= DIGEST_HEX_LEN {
            return None;
        }

        let prefix = text.get(..DIGEST_HEX_LEN)?;
        let blob = text.get(DIGEST_HEX_LEN..)?;
        if fingerprint(crypto, &format!("{}{}", blob, sender)) != prefix {
            return None;
        }

        serde_json::from_str(blob).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Sha256Crypto;

    fn sample() -> PeerMessage {
        PeerMessage::new(
            PeerCommand::Move,
            Some("aa".repeat(32)),
            "bb".repeat(32),
            r#"{"action":"place","playerId":"x","pieceId":0,"toCellId":0}"#,
        )
    }

    #[test]
    fn test_command_names() {
        for cmd in PeerCommand::ALL {
            assert_eq!(PeerCommand::from_name(cmd.as_str()), Some(cmd));
            assert_eq!(serde_json::to_string(&cmd).unwrap(), format!("\"{}\"", cmd.as_str()));
        }
        assert_eq!(PeerCommand::from_name("helo"), None);
        assert!(PeerCommand::Helo.is_handshake());
        assert!(!PeerCommand::PlayWithMe.is_handshake());
        assert!(PeerCommand::ResyncResponse.is_resync());
        assert!(PeerCommand::HashMismatch.is_notice());
        assert!(!PeerCommand::Move.is_notice());
        assert_eq!(PeerCommand::from_name("HASH_MISMATCH"), Some(PeerCommand::HashMismatch));
        assert_eq!(PeerCommand::from_name("ERROR"), Some(PeerCommand::Error));
    }

    #[test]
    fn test_wire_format() {
        let msg = sample();
        let wire = msg.to_wire();
        assert!(wire.starts_with("MOVE:"));
        // 载荷中的冒号保留在载荷内
        assert_eq!(PeerMessage::from_wire(&wire), Some(msg));
    }

    #[test]
    fn test_wire_format_null_prior() {
        let msg = PeerMessage::from_wire("HELO::newStateHash:data").unwrap();
        assert_eq!(msg.command, PeerCommand::Helo);
        assert_eq!(msg.prior_state_hash, None);
        assert_eq!(msg.new_state_hash, "newStateHash");
        assert_eq!(msg.payload, "data");
        assert_eq!(msg.to_wire(), "HELO::newStateHash:data");
    }

    #[test]
    fn test_wire_format_malformed() {
        assert_eq!(PeerMessage::from_wire(""), None);
        assert_eq!(PeerMessage::from_wire("HELO:a:b"), None);
        assert_eq!(PeerMessage::from_wire("BONJOUR:a:b:c"), None);
        assert_eq!(PeerMessage::from_wire("HELO:a::c"), None);
    }

    #[test]
    fn test_seal_and_open() {
        let crypto = Sha256Crypto;
        let msg = sample();
        let sealed = msg.seal(&crypto, "peer-a").unwrap();

        assert_eq!(&sealed[DIGEST_HEX_LEN..], msg.to_json().unwrap());
        assert_eq!(PeerMessage::open(sealed.as_bytes(), &crypto, "peer-a"), Some(msg));
        // 发送方不符
        assert_eq!(PeerMessage::open(sealed.as_bytes(), &crypto, "peer-b"), None);
    }

    #[test]
    fn test_open_rejects_malformed() {
        let crypto = Sha256Crypto;
        let sealed = sample().seal(&crypto, "peer-a").unwrap();

        // 过短
        assert_eq!(PeerMessage::open(&sealed.as_bytes()[..DIGEST_HEX_LEN], &crypto, "peer-a"), None);
        // 前缀被篡改
        let tampered = format!("{}{}", "0".repeat(DIGEST_HEX_LEN), &sealed[DIGEST_HEX_LEN..]);
        assert_eq!(PeerMessage::open(tampered.as_bytes(), &crypto, "peer-a"), None);
        // 非 UTF-8
        assert_eq!(PeerMessage::open(&[0xff; 80], &crypto, "peer-a"), None);

        // 前缀正确但消息体无法解析
        let blob = "{not json";
        let frame = format!("{}{}", fingerprint(&crypto, &format!("{}peer-a", blob)), blob);
        assert_eq!(PeerMessage::open(frame.as_bytes(), &crypto, "peer-a"), None);

        // 缺少必需字段
        let blob = r#"{"command":"HELO","priorStateHash":null}"#;
        let frame = format!("{}{}", fingerprint(&crypto, &format!("{}peer-a", blob)), blob);
        assert_eq!(PeerMessage::open(frame.as_bytes(), &crypto, "peer-a"), None);
    }

    #[test]
    fn test_json_field_names() {
        let json = sample().to_json().unwrap();
        assert!(json.contains(r#""command":"MOVE""#));
        assert!(json.contains(r#""priorStateHash""#));
        assert!(json.contains(r#""newStateHash""#));
    }
}
