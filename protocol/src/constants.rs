//! 协议常量定义

use std::time::Duration;

/// 协议版本号
pub const PROTOCOL_VERSION: u8 = 1;

/// 玩家数量
pub const PLAYER_COUNT: usize = 2;

/// 标准棋盘格点数
pub const STANDARD_CELL_COUNT: usize = 24;

/// 标准棋子总数（双方合计）
pub const STANDARD_PIECE_COUNT: usize = 18;

/// 每方棋子数
pub const PIECES_PER_PLAYER: usize = STANDARD_PIECE_COUNT / PLAYER_COUNT;

/// 成三所需连子数
pub const MILL_SIZE: usize = 3;

/// 继续对局所需的最少棋子数
pub const MIN_PIECES_TO_PLAY: usize = 3;

/// 飞子阈值：剩余棋子数不超过此值时可以飞子
pub const FLYING_THRESHOLD: usize = 3;

/// 棋盘坐标网格边长
pub const GRID_SIZE: u8 = 7;

/// 摘要的十六进制长度（SHA-256）
pub const DIGEST_HEX_LEN: usize = 64;

/// 消息帧最大大小
pub const MAX_FRAME_SIZE: usize = 65536;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 会话过期时间（毫秒）- 5分钟
pub const SESSION_EXPIRY_MS: i64 = 5 * 60 * 1000;

/// 先手方显示名
pub const INITIATOR_NAME: &str = "X";

/// 后手方显示名
pub const RESPONDER_NAME: &str = "O";

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
