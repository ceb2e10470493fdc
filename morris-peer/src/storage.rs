//! 会话存储
//!
//! 每对 (本方, 对方) 只保留一个会话文件，重连时据此恢复对局和指纹链。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use morris_protocol::{GameSnapshot, SESSION_EXPIRY_MS};
use serde::{Deserialize, Serialize};

use crate::peer::PeerRole;
use crate::settings::APP_DIR_NAME;

/// 持久化会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub game_state: Option<GameSnapshot>,
    pub opponent_id: String,
    pub my_peer_id: String,
    pub role: PeerRole,
    pub last_state_hash: Option<String>,
    /// 保存时间（Unix 毫秒）
    pub timestamp_millis: i64,
    pub is_connected: bool,
}

impl PersistedSession {
    /// 在 `now_millis` 时是否已过期
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis - self.timestamp_millis > SESSION_EXPIRY_MS
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// 保存时间
    pub fn saved_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp_millis).unwrap_or_default()
    }
}

/// 会话概要
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// 会话 ID（文件名）
    pub session_id: String,
    pub opponent_id: String,
    pub role: PeerRole,
    pub saved_at: DateTime<Utc>,
    /// 已完成回合数
    pub turn: u32,
}

/// 会话存储
pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// 使用默认数据目录
    pub fn new() -> Result<Self> {
        Self::with_directory(get_sessions_directory()?)
    }

    /// 使用指定目录
    pub fn with_directory(sessions_dir: impl Into<PathBuf>) -> Result<Self> {
        let sessions_dir = sessions_dir.into();
        if !sessions_dir.exists() {
            fs::create_dir_all(&sessions_dir)
                .with_context(|| format!("无法创建会话目录: {:?}", sessions_dir))?;
        }
        Ok(Self { sessions_dir })
    }

    /// 保存会话，返回会话 ID
    pub fn save_session(&self, session: &PersistedSession) -> Result<String> {
        let filename = session_filename(&session.my_peer_id, &session.opponent_id);
        let filepath = self.sessions_dir.join(&filename);

        let content = serde_json::to_string_pretty(session).context("序列化会话失败")?;
        fs::write(&filepath, content).with_context(|| format!("写入文件失败: {:?}", filepath))?;

        tracing::debug!(session = %filename, "会话已保存");
        Ok(filename)
    }

    /// 加载会话
    pub fn load_session(&self, session_id: &str) -> Result<PersistedSession> {
        let filepath = self.sessions_dir.join(session_id);
        if !filepath.exists() {
            anyhow::bail!("会话文件不存在: {}", session_id);
        }

        let content = fs::read_to_string(&filepath).with_context(|| format!("读取文件失败: {:?}", filepath))?;
        serde_json::from_str(&content).context("解析会话文件失败")
    }

    /// 加载与指定对方的会话
    pub fn load_for(&self, my_peer_id: &str, opponent_id: &str) -> Result<PersistedSession> {
        self.load_session(&session_filename(my_peer_id, opponent_id))
    }

    /// 列出所有会话，最新的在前
    pub fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let mut sessions = Vec::new();
        for (session_id, session) in self.read_all()? {
            sessions.push(SessionInfo {
                session_id,
                opponent_id: session.opponent_id.clone(),
                role: session.role,
                saved_at: session.saved_at(),
                turn: session.game_state.as_ref().map_or(0, |state| state.turn),
            });
        }

        sessions.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(sessions)
    }

    /// 最近一个未过期的会话
    pub fn latest_session(&self) -> Result<Option<PersistedSession>> {
        let now = Utc::now().timestamp_millis();
        Ok(self
            .read_all()?
            .into_iter()
            .map(|(_, session)| session)
            .filter(|session| !session.is_expired_at(now))
            .max_by_key(|session| session.timestamp_millis))
    }

    /// 删除会话
    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        let filepath = self.sessions_dir.join(session_id);
        if filepath.exists() {
            fs::remove_file(&filepath).with_context(|| format!("删除文件失败: {:?}", filepath))?;
        }
        Ok(())
    }

    /// 删除所有在 `now_millis` 时已过期的会话，返回删除数量
    pub fn purge_expired(&self, now_millis: i64) -> Result<usize> {
        let mut removed = 0;
        for (session_id, session) in self.read_all()? {
            if session.is_expired_at(now_millis) {
                self.delete_session(&session_id)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!("已清理 {} 个过期会话", removed);
        }
        Ok(removed)
    }

    pub fn sessions_directory(&self) -> &Path {
        &self.sessions_dir
    }

    /// 读取目录下所有可解析的会话，跳过损坏的文件
    fn read_all(&self) -> Result<Vec<(String, PersistedSession)>> {
        let mut sessions = Vec::new();
        if !self.sessions_dir.exists() {
            return Ok(sessions);
        }

        let entries = fs::read_dir(&self.sessions_dir)
            .with_context(|| format!("读取会话目录失败: {:?}", self.sessions_dir))?;

        for entry in entries {
            let path = entry.context("读取目录项失败")?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load_session(filename) {
                Ok(session) => sessions.push((filename.to_string(), session)),
                Err(e) => tracing::warn!("跳过损坏的会话文件 {}: {:#}", filename, e),
            }
        }
        Ok(sessions)
    }
}

/// 获取跨平台会话目录
fn get_sessions_directory() -> Result<PathBuf> {
    let app_data_dir = dirs::data_dir().context("无法获取应用数据目录")?;
    Ok(app_data_dir.join(APP_DIR_NAME).join("sessions"))
}

fn session_filename(my_peer_id: &str, opponent_id: &str) -> String {
    format!("{}_vs_{}.json", sanitize_filename(my_peer_id), sanitize_filename(opponent_id))
}

/// 清理文件名中的特殊字符
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
