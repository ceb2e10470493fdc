//! 走法定义与合法走法生成

use serde::{Deserialize, Serialize};

use crate::game::{Game, GamePhase};
use crate::piece::CellId;
use crate::rules::GameRules;

/// 走法类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameAction {
    /// 落子
    Place,
    /// 移动（含飞子）
    Move,
    /// 吃子
    Remove,
}

/// 走法（对端消息载荷）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Move {
    pub action: GameAction,
    /// 行动方玩家 ID
    pub player_id: String,
    /// 落下或移动的棋子编号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece_id: Option<u8>,
    /// 移动起点
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_cell_id: Option<CellId>,
    /// 目标格点；吃子时为被吃棋子所在格点
    pub to_cell_id: CellId,
    /// 被吃棋子编号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_piece_id: Option<u8>,
}

impl Move {
    /// 落子走法
    pub fn place(player_id: impl Into<String>, piece_id: u8, to: CellId) -> Self {
        Self {
            action: GameAction::Place,
            player_id: player_id.into(),
            piece_id: Some(piece_id),
            from_cell_id: None,
            to_cell_id: to,
            removed_piece_id: None,
        }
    }

    /// 移动走法
    pub fn movement(player_id: impl Into<String>, piece_id: u8, from: CellId, to: CellId) -> Self {
        Self {
            action: GameAction::Move,
            player_id: player_id.into(),
            piece_id: Some(piece_id),
            from_cell_id: Some(from),
            to_cell_id: to,
            removed_piece_id: None,
        }
    }

    /// 吃子走法
    pub fn removal(player_id: impl Into<String>, cell: CellId, removed_piece_id: u8) -> Self {
        Self {
            action: GameAction::Remove,
            player_id: player_id.into(),
            piece_id: None,
            from_cell_id: None,
            to_cell_id: cell,
            removed_piece_id: Some(removed_piece_id),
        }
    }

    /// 序列化为 JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 从 JSON 反序列化
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.action, self.from_cell_id) {
            (GameAction::Move, Some(from)) => write!(f, "move {} -> {}", from, self.to_cell_id),
            (GameAction::Remove, _) => write!(f, "remove @{}", self.to_cell_id),
            _ => write!(f, "place @{}", self.to_cell_id),
        }
    }
}

/// 走法生成器
pub struct MoveGenerator;

impl MoveGenerator {
    /// 生成当前行动方的所有合法走法
    pub fn generate_legal(game: &Game) -> Vec<Move> {
        let board = game.board();
        let player = game.current_player();

        match game.phase() {
            GamePhase::GameOver => Vec::new(),
            GamePhase::Placement => match player.next_piece() {
                Some(next) => board
                    .cells()
                    .filter(|cell| GameRules::is_valid_placement(cell, player, GamePhase::Placement))
                    .map(|cell| Move::place(player.id(), next.id, cell.id))
                    .collect(),
                None => Vec::new(),
            },
            GamePhase::Movement => player
                .placed_pieces()
                .flat_map(|piece| {
                    let from = piece.cell();
                    GameRules::get_valid_moves_for_piece(piece, board)
                        .into_iter()
                        .filter_map(move |to| from.map(|from| Move::movement(player.id(), piece.id(), from, to)))
                })
                .collect(),
            GamePhase::Capture => game
                .removable_pieces()
                .iter()
                .filter_map(|&key| board.piece(key).ok())
                .filter_map(|piece| piece.cell().map(|cell| Move::removal(player.id(), cell, piece.id())))
                .collect(),
        }
    }
}
