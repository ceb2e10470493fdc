//! 棋子与格点定义

use serde::{Deserialize, Serialize};

use crate::error::MorrisError;

/// 格点 ID（同时也是图中的顶点 ID）
pub type CellId = usize;

/// 阵营
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 先手（发起方）
    Initiator,
    /// 后手（应答方）
    Responder,
}

impl Side {
    /// 获取对方阵营
    pub fn opponent(&self) -> Side {
        match self {
            Side::Initiator => Side::Responder,
            Side::Responder => Side::Initiator,
        }
    }

    /// 在玩家数组中的下标（先手在 0 号位）
    pub fn index(&self) -> usize {
        match self {
            Side::Initiator => 0,
            Side::Responder => 1,
        }
    }
}

/// 棋子生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceState {
    /// 尚未落子
    Unplaced,
    /// 在棋盘上
    Placed,
    /// 已被吃掉（终态）
    Removed,
}

/// 棋子引用：所属阵营 + 阵营内编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceKey {
    pub owner: Side,
    pub id: u8,
}

impl PieceKey {
    pub fn new(owner: Side, id: u8) -> Self {
        Self { owner, id }
    }
}

/// 棋子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamePiece {
    owner: Side,
    id: u8,
    state: PieceState,
    cell: Option<CellId>,
}

impl GamePiece {
    /// 创建未落子的棋子
    pub fn new(owner: Side, id: u8) -> Self {
        Self {
            owner,
            id,
            state: PieceState::Unplaced,
            cell: None,
        }
    }

    pub fn owner(&self) -> Side {
        self.owner
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn key(&self) -> PieceKey {
        PieceKey::new(self.owner, self.id)
    }

    pub fn state(&self) -> PieceState {
        self.state
    }

    /// 所在格点，仅在 `Placed` 状态下存在
    pub fn cell(&self) -> Option<CellId> {
        self.cell
    }

    pub fn is_placed(&self) -> bool {
        self.state == PieceState::Placed
    }

    pub fn is_removed(&self) -> bool {
        self.state == PieceState::Removed
    }

    fn unavailable(&self, action: &'static str) -> MorrisError {
        MorrisError::PieceUnavailable {
            id: self.id,
            state: self.state,
            action,
        }
    }

    /// 落子：Unplaced -> Placed
    pub(crate) fn place(&mut self, cell: CellId) -> Result<(), MorrisError> {
        if self.state != PieceState::Unplaced {
            return Err(self.unavailable("placed"));
        }
        self.state = PieceState::Placed;
        self.cell = Some(cell);
        Ok(())
    }

    /// 移动：Placed -> Placed
    pub(crate) fn relocate(&mut self, cell: CellId) -> Result<(), MorrisError> {
        if self.state != PieceState::Placed {
            return Err(self.unavailable("moved"));
        }
        self.cell = Some(cell);
        Ok(())
    }

    /// 吃掉：Placed -> Removed
    pub(crate) fn remove(&mut self) -> Result<(), MorrisError> {
        if self.state != PieceState::Placed {
            return Err(self.unavailable("removed"));
        }
        self.state = PieceState::Removed;
        self.cell = None;
        Ok(())
    }

    /// 从快照恢复时直接标记为已吃掉
    pub(crate) fn discard(&mut self) -> Result<(), MorrisError> {
        if self.state != PieceState::Unplaced {
            return Err(self.unavailable("discarded"));
        }
        self.state = PieceState::Removed;
        Ok(())
    }
}

/// 棋盘格点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub row: u8,
    pub col: u8,
    piece: Option<PieceKey>,
}

impl Cell {
    pub fn new(id: CellId, row: u8, col: u8) -> Self {
        Self {
            id,
            row,
            col,
            piece: None,
        }
    }

    /// 占据此格点的棋子
    pub fn piece(&self) -> Option<PieceKey> {
        self.piece
    }

    pub fn is_empty(&self) -> bool {
        self.piece.is_none()
    }

    /// 占据格点
    pub fn occupy(&mut self, piece: PieceKey) -> Result<(), MorrisError> {
        if self.piece.is_some() {
            return Err(MorrisError::CellOccupied(self.id));
        }
        self.piece = Some(piece);
        Ok(())
    }

    /// 腾空格点
    pub fn vacate(&mut self) -> Result<PieceKey, MorrisError> {
        self.piece.take().ok_or(MorrisError::CellVacant(self.id))
    }
}
