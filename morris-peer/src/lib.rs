//! 九子棋对等端
//!
//! 包含:
//! - 对端同步状态与角色行为
//! - 连接上的消息中转
//! - 会话持久化与设置
//! - 随机自动对弈

pub mod autoplay;
pub mod broker;
pub mod peer;
pub mod settings;
pub mod storage;

pub use autoplay::{run_autoplay, AutoplayOptions};
pub use broker::PeerBroker;
pub use peer::{PeerRole, PeerState, SyncError};
pub use settings::PeerSettings;
pub use storage::{PersistedSession, SessionInfo, SessionStore};
