//! 错误类型定义

use thiserror::Error;

use crate::piece::{CellId, PieceState, Side};

/// 图结构错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// 顶点不存在
    #[error("Invalid vertex: {0}")]
    InvalidVertex(usize),

    /// 源顶点筛选结果不唯一
    #[error("Source filter must match exactly one vertex, matched {matched}")]
    InvalidSource { matched: usize },

    /// 目标顶点筛选结果为空
    #[error("Destination filter matched no vertex")]
    InvalidDestination,
}

/// 九子棋规则错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MorrisError {
    /// 格点已被占用
    #[error("Cell {0} is already occupied")]
    CellOccupied(CellId),

    /// 格点为空
    #[error("Cell {0} is already vacant")]
    CellVacant(CellId),

    /// 棋子状态不允许此操作
    #[error("Piece {id} is {state:?} and cannot be {action}")]
    PieceUnavailable {
        id: u8,
        state: PieceState,
        action: &'static str,
    },

    /// 无效的走法
    #[error("Invalid move: from {from:?} to {to}")]
    InvalidMove { from: Option<CellId>, to: CellId },

    /// 无效的落子
    #[error("Invalid placement at cell {0}")]
    InvalidPlacement(CellId),

    /// 无效的吃子
    #[error("Piece at cell {0} cannot be removed")]
    InvalidRemoval(CellId),

    /// 棋子不存在
    #[error("Unknown piece {id} of {owner:?}")]
    UnknownPiece { owner: Side, id: u8 },

    /// 格点上没有可操作的棋子
    #[error("No eligible piece at cell {0}")]
    NoPiece(CellId),

    /// 不是你的回合
    #[error("Not your turn")]
    NotYourTurn,

    /// 当前阶段不允许此操作
    #[error("Action {action} is not allowed during {phase}")]
    WrongPhase { action: String, phase: String },

    /// 游戏已结束
    #[error("Game is already over")]
    GameOver,

    /// 格点不存在
    #[error("Invalid cell: {0}")]
    InvalidCell(CellId),

    /// 棋盘配置不合法
    #[error("Invalid board configuration: {reason}")]
    InvalidBoard { reason: String },

    /// 玩家配置不合法
    #[error("Invalid players: {reason}")]
    InvalidPlayers { reason: String },

    /// 未知玩家
    #[error("Unknown player: {0}")]
    UnknownPlayer(String),

    /// 走法缺少必需字段
    #[error("Move is missing field `{0}`")]
    MissingField(&'static str),

    /// 上一回合的状态指纹尚未记录
    #[error("Turn {pending} is still waiting for its state hash")]
    LedgerBusy { pending: u32 },

    /// 回合编号不连续
    #[error("Ledger expected turn {expected}, got {actual}")]
    LedgerGap { expected: u32, actual: u32 },

    /// 快照序列化失败
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// 图结构错误
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

/// 传输错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误（bincode）
    #[error("Bincode serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// 协议版本不匹配
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,
}

/// 传输操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for MorrisError {
    fn from(err: serde_json::Error) -> Self {
        MorrisError::Snapshot(err.to_string())
    }
}
