//! 对端设置
//!
//! 保存在 `config_dir()/nine-peers-morris/settings.json`，缺失或损坏时使用默认值。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use morris_protocol::{BoardOptions, NetworkConfig};
use serde::{Deserialize, Serialize};

/// 应用目录名
pub const APP_DIR_NAME: &str = "nine-peers-morris";

/// 对端设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeerSettings {
    /// 监听地址，端口为 0 时由系统分配
    pub network: NetworkConfig,
    /// 主机发出邀请时使用的棋盘配置
    pub board: BoardOptions,
    /// 自动对弈的回合上限
    pub max_turns: u32,
    /// 自动对弈随机种子，为空时每次随机
    pub seed: Option<u64>,
    /// 对局结束后是否保存会话
    pub save_sessions: bool,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                port: 0,
                ..Default::default()
            },
            board: BoardOptions::default(),
            max_turns: 300,
            seed: None,
            save_sessions: true,
        }
    }
}

impl PeerSettings {
    /// 获取设置文件路径
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push(APP_DIR_NAME);
            path.push("settings.json");
            path
        })
    }

    /// 从默认位置加载设置
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            tracing::warn!("无法获取配置目录，使用默认设置");
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// 从指定文件加载设置
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("设置文件不存在，使用默认设置");
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    tracing::info!("已加载设置: {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("设置文件格式无效: {}，使用默认设置", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("无法读取设置文件: {}，使用默认设置", e);
                Self::default()
            }
        }
    }

    /// 保存到默认位置
    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path().context("无法获取配置目录")?;
        self.save_to(&path)
    }

    /// 保存到指定文件
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("无法创建配置目录")?;
        }

        let content = serde_json::to_string_pretty(self).context("序列化设置失败")?;
        std::fs::write(path, content).context("写入设置文件失败")?;

        tracing::info!("设置已保存: {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = PeerSettings::default();
        assert_eq!(settings.network.port, 0);
        assert_eq!(settings.board, BoardOptions::default());
        assert!(settings.seed.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let settings = PeerSettings {
            max_turns: 40,
            seed: Some(7),
            ..Default::default()
        };
        settings.save_to(&path).unwrap();

        assert_eq!(PeerSettings::load_from(&path), settings);
    }

    #[test]
    fn test_missing_or_corrupt_file_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        assert_eq!(PeerSettings::load_from(&path), PeerSettings::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(PeerSettings::load_from(&path), PeerSettings::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"maxTurns": 12}"#).unwrap();

        let settings = PeerSettings::load_from(&path);
        assert_eq!(settings.max_turns, 12);
        assert!(settings.save_sessions);
    }
}
