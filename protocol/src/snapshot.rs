//! 对局快照格式
//!
//! 用于状态指纹计算、断线重同步以及本地会话持久化。
//! 字段顺序固定，序列化结果是确定性的。

use serde::{Deserialize, Serialize};

use crate::game::GamePhase;
use crate::graph::GraphEntry;
use crate::piece::{Cell, CellId, PieceState};

/// 棋子快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceSnapshot {
    /// 所属玩家 ID
    pub player_id: String,
    /// 所在格点
    pub cell_id: Option<CellId>,
    pub state: PieceState,
}

/// 玩家快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: String,
    pub name: String,
    /// 全部棋子，按编号排列
    pub pieces: Vec<PieceSnapshot>,
    pub is_winner: bool,
}

/// 完整对局快照（先手方在 0 号位）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub players: [PlayerSnapshot; 2],
    pub current_player_id: String,
    pub winner: Option<String>,
    pub turn: u32,
    /// 当前阶段，吃子阶段的快照据此恢复吃子义务
    pub phase: GamePhase,
}

impl GameSnapshot {
    /// 序列化为 JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 从 JSON 反序列化
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// 棋盘快照
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot<'a> {
    pub players: Vec<PlayerSnapshot>,
    pub graph: Vec<GraphEntry<'a, Cell>>,
    pub mill_count: usize,
    pub piece_count: usize,
    pub cell_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str) -> PlayerSnapshot {
        PlayerSnapshot {
            id: id.to_string(),
            name: id.to_uppercase(),
            pieces: vec![PieceSnapshot {
                player_id: id.to_string(),
                cell_id: Some(3),
                state: PieceState::Placed,
            }],
            is_winner: false,
        }
    }

    #[test]
    fn test_game_snapshot_json() {
        let snapshot = GameSnapshot {
            players: [player("x"), player("o")],
            current_player_id: "o".to_string(),
            winner: None,
            turn: 1,
            phase: GamePhase::Placement,
        };

        let json = snapshot.to_json().unwrap();
        assert!(json.contains(r#""currentPlayerId":"o""#));
        assert!(json.contains(r#""cellId":3"#));
        assert!(json.contains(r#""isWinner":false"#));
        assert!(json.contains(r#""phase":"placement""#));

        let parsed = GameSnapshot::from_json(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_snapshot_requires_two_players() {
        let json = r#"{"players":[],"currentPlayerId":"x","winner":null,"turn":0,"phase":"placement"}"#;
        assert!(GameSnapshot::from_json(json).is_err());
    }
}
