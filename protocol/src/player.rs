//! 玩家定义

use crate::piece::{GamePiece, PieceKey, PieceState, Side};
use crate::snapshot::{PieceSnapshot, PlayerSnapshot};

/// 玩家 ID（对端标识）
pub type PlayerId = String;

/// 玩家
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    id: PlayerId,
    name: String,
    is_initiator: bool,
    pieces: Vec<GamePiece>,
    is_winner: bool,
}

impl Player {
    /// 创建玩家（棋子由棋盘在构造时分配）
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, is_initiator: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_initiator,
            pieces: Vec::new(),
            is_winner: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    pub fn side(&self) -> Side {
        if self.is_initiator {
            Side::Initiator
        } else {
            Side::Responder
        }
    }

    pub fn is_winner(&self) -> bool {
        self.is_winner
    }

    pub(crate) fn set_winner(&mut self, winner: bool) {
        self.is_winner = winner;
    }

    /// 重新分配 `count` 枚未落子的棋子
    pub(crate) fn reset_pieces(&mut self, count: usize) {
        let side = self.side();
        self.pieces = (0..count).map(|id| GamePiece::new(side, id as u8)).collect();
        self.is_winner = false;
    }

    pub fn piece(&self, id: u8) -> Option<&GamePiece> {
        self.pieces.get(id as usize)
    }

    pub(crate) fn piece_mut(&mut self, id: u8) -> Option<&mut GamePiece> {
        self.pieces.get_mut(id as usize)
    }

    /// 所有棋子（含已被吃掉的）
    pub fn pieces(&self) -> &[GamePiece] {
        &self.pieces
    }

    fn pieces_in(&self, state: PieceState) -> impl Iterator<Item = &GamePiece> {
        self.pieces.iter().filter(move |p| p.state() == state)
    }

    /// 仍在对局中的棋子（未落子 + 在棋盘上）
    pub fn active_pieces(&self) -> impl Iterator<Item = &GamePiece> {
        self.pieces.iter().filter(|p| !p.is_removed())
    }

    pub fn placed_pieces(&self) -> impl Iterator<Item = &GamePiece> {
        self.pieces_in(PieceState::Placed)
    }

    pub fn unplaced_pieces(&self) -> impl Iterator<Item = &GamePiece> {
        self.pieces_in(PieceState::Unplaced)
    }

    pub fn removed_pieces(&self) -> impl Iterator<Item = &GamePiece> {
        self.pieces_in(PieceState::Removed)
    }

    /// 下一枚待落的棋子
    pub fn next_piece(&self) -> Option<PieceKey> {
        self.unplaced_pieces().next().map(GamePiece::key)
    }

    pub fn has_unplaced_pieces(&self) -> bool {
        self.next_piece().is_some()
    }

    /// 仍在对局中的棋子数
    pub fn piece_count(&self) -> usize {
        self.active_pieces().count()
    }

    /// 生成快照
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            pieces: self
                .pieces
                .iter()
                .map(|p| PieceSnapshot {
                    player_id: self.id.clone(),
                    cell_id: p.cell(),
                    state: p.state(),
                })
                .collect(),
            is_winner: self.is_winner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player() {
        let mut player = Player::new("peer-a", "X", true);
        assert_eq!(player.side(), Side::Initiator);
        assert_eq!(player.piece_count(), 0);
        assert_eq!(player.next_piece(), None);

        player.reset_pieces(9);
        assert_eq!(player.piece_count(), 9);
        assert_eq!(player.next_piece(), Some(PieceKey::new(Side::Initiator, 0)));
    }

    #[test]
    fn test_piece_views() {
        let mut player = Player::new("peer-b", "O", false);
        player.reset_pieces(3);

        player.piece_mut(0).unwrap().place(7).unwrap();
        player.piece_mut(1).unwrap().place(8).unwrap();
        player.piece_mut(1).unwrap().remove().unwrap();

        assert_eq!(player.placed_pieces().count(), 1);
        assert_eq!(player.unplaced_pieces().count(), 1);
        assert_eq!(player.removed_pieces().count(), 1);
        assert_eq!(player.piece_count(), 2);
        assert_eq!(player.next_piece(), Some(PieceKey::new(Side::Responder, 2)));
    }

    #[test]
    fn test_snapshot() {
        let mut player = Player::new("peer-a", "X", true);
        player.reset_pieces(2);
        player.piece_mut(1).unwrap().place(3).unwrap();

        let snapshot = player.snapshot();
        assert_eq!(snapshot.pieces.len(), 2);
        assert_eq!(snapshot.pieces[0].cell_id, None);
        assert_eq!(snapshot.pieces[1].cell_id, Some(3));
        assert_eq!(snapshot.pieces[1].state, PieceState::Placed);
        assert!(!snapshot.is_winner);
    }
}
