//! 规则判定
//!
//! 全部为无副作用的纯函数，可用于界面提示等推测性查询。

use crate::board::Board;
use crate::constants::MIN_PIECES_TO_PLAY;
use crate::game::GamePhase;
use crate::piece::{Cell, CellId, GamePiece, PieceKey};
use crate::player::Player;

/// 规则集
pub struct GameRules;

impl GameRules {
    /// 从 `from` 到 `to` 是否为合法走法
    pub fn is_valid_move(from: CellId, to: CellId, board: &Board, can_fly: bool) -> bool {
        match board.cell(to) {
            Ok(cell) if cell.is_empty() => can_fly || board.is_adjacent(from, to),
            _ => false,
        }
    }

    /// 玩家棋子数是否已降到飞子门槛
    ///
    /// 只看门槛，不看棋盘是否开启飞子；实际执行走法以 [`Board::can_fly`] 为准。
    pub fn can_player_fly(player: &Player, board: &Board) -> bool {
        player.piece_count() <= board.options().fly_at
    }

    /// 对方可被吃掉的棋子：优先不在三连中的棋子，全部成三时全部可吃
    pub fn get_removable_pieces(opponent: &Player, board: &Board) -> Vec<PieceKey> {
        let placed: Vec<&GamePiece> = opponent.placed_pieces().collect();

        let unprotected: Vec<PieceKey> = placed
            .iter()
            .filter(|piece| piece.cell().map(|cell| !board.check_for_mill(cell)).unwrap_or(false))
            .map(|piece| piece.key())
            .collect();

        if unprotected.is_empty() {
            placed.iter().map(|piece| piece.key()).collect()
        } else {
            unprotected
        }
    }

    /// `player` 是否已经获胜
    pub fn has_player_won(player: &Player, opponent: &Player, phase: GamePhase, board: &Board) -> bool {
        debug_assert_ne!(player.side(), opponent.side());

        match phase {
            GamePhase::Movement | GamePhase::Capture => {
                if opponent.piece_count() < MIN_PIECES_TO_PLAY {
                    return true;
                }
                phase == GamePhase::Movement && Self::is_blocked(opponent, board)
            }
            _ => false,
        }
    }

    /// 棋盘上的棋子全部无路可走
    pub fn is_blocked(player: &Player, board: &Board) -> bool {
        player
            .placed_pieces()
            .all(|piece| Self::get_valid_moves_for_piece(piece, board).is_empty())
    }

    /// 棋子的所有合法目标格点
    pub fn get_valid_moves_for_piece(piece: &GamePiece, board: &Board) -> Vec<CellId> {
        let Some(from) = piece.cell().filter(|_| piece.is_placed()) else {
            return Vec::new();
        };

        if board.can_fly(piece.owner()) {
            return board.empty_cells();
        }

        board
            .neighbors(from)
            .map(|neighbors| {
                neighbors
                    .iter()
                    .copied()
                    .filter(|&to| Self::is_valid_move(from, to, board, false))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 是否可以在 `cell` 落子
    pub fn is_valid_placement(cell: &Cell, player: &Player, phase: GamePhase) -> bool {
        phase == GamePhase::Placement && cell.is_empty() && player.has_unplaced_pieces()
    }

    /// `acting` 能否吃掉 `piece`
    pub fn is_valid_removal(piece: &GamePiece, acting: &Player, board: &Board) -> bool {
        if piece.owner() == acting.side() || !piece.is_placed() {
            return false;
        }
        let opponent = board.player(piece.owner());
        Self::get_removable_pieces(opponent, board).contains(&piece.key())
    }

    /// 计算下一阶段：所有玩家都落完子后进入走子阶段
    pub fn get_next_phase(current: GamePhase, players: &[Player]) -> GamePhase {
        match current {
            GamePhase::Placement if players.iter().all(|p| !p.has_unplaced_pieces()) => GamePhase::Movement,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardOptions;
    use crate::piece::Side;

    fn board_with(pieces: usize) -> Board {
        let players = [Player::new("x", "X", true), Player::new("o", "O", false)];
        Board::new(
            players,
            BoardOptions {
                pieces,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn x(id: u8) -> PieceKey {
        PieceKey::new(Side::Initiator, id)
    }

    fn o(id: u8) -> PieceKey {
        PieceKey::new(Side::Responder, id)
    }

    #[test]
    fn test_is_valid_move() {
        let mut board = board_with(18);
        board.place_piece(x(0), 0).unwrap();
        board.place_piece(o(0), 9).unwrap();

        assert!(GameRules::is_valid_move(0, 1, &board, false));
        // 目标被占
        assert!(!GameRules::is_valid_move(0, 9, &board, false));
        assert!(!GameRules::is_valid_move(0, 9, &board, true));
        // 不相邻
        assert!(!GameRules::is_valid_move(0, 23, &board, false));
        assert!(GameRules::is_valid_move(0, 23, &board, true));
    }

    #[test]
    fn test_can_player_fly() {
        let board = board_with(18);
        assert!(!GameRules::can_player_fly(board.player(Side::Initiator), &board));

        let board = board_with(6);
        assert!(GameRules::can_player_fly(board.player(Side::Initiator), &board));
    }

    #[test]
    fn test_can_player_fly_ignores_fly_switch() {
        let players = [Player::new("x", "X", true), Player::new("o", "O", false)];
        let mut board = Board::new(
            players,
            BoardOptions {
                pieces: 6,
                fly: false,
                ..Default::default()
            },
        )
        .unwrap();
        board.place_piece(x(0), 0).unwrap();

        assert!(GameRules::can_player_fly(board.player(Side::Initiator), &board));
        assert!(!board.can_fly(Side::Initiator));
        // 关闭飞子时只能走相邻格
        let moves = GameRules::get_valid_moves_for_piece(board.piece(x(0)).unwrap(), &board);
        assert!(!moves.is_empty());
        assert!(!moves.contains(&23));
    }

    #[test]
    fn test_removable_pieces_prefers_unprotected() {
        let mut board = board_with(18);
        for (id, cell) in [(0, 0), (1, 1), (2, 2), (3, 3)] {
            board.place_piece(o(id), cell).unwrap();
        }

        let removable = GameRules::get_removable_pieces(board.player(Side::Responder), &board);
        assert_eq!(removable, vec![o(3)]);
    }

    #[test]
    fn test_removable_pieces_all_in_mills() {
        let mut board = board_with(18);
        for (id, cell) in [(0, 0), (1, 1), (2, 2)] {
            board.place_piece(o(id), cell).unwrap();
        }

        let removable = GameRules::get_removable_pieces(board.player(Side::Responder), &board);
        assert_eq!(removable, vec![o(0), o(1), o(2)]);
    }

    #[test]
    fn test_is_valid_removal() {
        let mut board = board_with(18);
        for (id, cell) in [(0, 0), (1, 1), (2, 2), (3, 3)] {
            board.place_piece(o(id), cell).unwrap();
        }
        board.place_piece(x(0), 4).unwrap();
        let acting = board.player(Side::Initiator);

        assert!(GameRules::is_valid_removal(board.piece(o(3)).unwrap(), acting, &board));
        // 受三连保护
        assert!(!GameRules::is_valid_removal(board.piece(o(0)).unwrap(), acting, &board));
        // 自己的棋子
        assert!(!GameRules::is_valid_removal(board.piece(x(0)).unwrap(), acting, &board));
        // 未落子
        assert!(!GameRules::is_valid_removal(board.piece(o(5)).unwrap(), acting, &board));
    }

    #[test]
    fn test_valid_moves_for_piece() {
        let mut board = board_with(18);
        board.place_piece(x(0), 4).unwrap();
        board.place_piece(o(0), 1).unwrap();

        let moves = GameRules::get_valid_moves_for_piece(board.piece(x(0)).unwrap(), &board);
        assert_eq!(moves, vec![3, 5, 7]);

        let unplaced = board.piece(x(1)).unwrap();
        assert!(GameRules::get_valid_moves_for_piece(unplaced, &board).is_empty());
    }

    #[test]
    fn test_valid_moves_when_flying() {
        let mut board = board_with(6);
        board.place_piece(x(0), 0).unwrap();

        let moves = GameRules::get_valid_moves_for_piece(board.piece(x(0)).unwrap(), &board);
        assert_eq!(moves.len(), 23);
        assert!(!moves.contains(&0));
    }

    #[test]
    fn test_is_valid_placement() {
        let mut board = board_with(2);
        let cell = board.cell(5).unwrap().clone();
        assert!(GameRules::is_valid_placement(&cell, board.player(Side::Initiator), GamePhase::Placement));
        assert!(!GameRules::is_valid_placement(&cell, board.player(Side::Initiator), GamePhase::Movement));

        board.place_piece(x(0), 5).unwrap();
        let occupied = board.cell(5).unwrap();
        assert!(!GameRules::is_valid_placement(occupied, board.player(Side::Responder), GamePhase::Placement));

        // 没有剩余棋子
        let empty = board.cell(6).unwrap();
        assert!(!GameRules::is_valid_placement(empty, board.player(Side::Initiator), GamePhase::Placement));
    }

    #[test]
    fn test_has_player_won_by_piece_count() {
        let mut board = board_with(6);
        board.place_piece(o(0), 0).unwrap();
        board.place_piece(o(1), 1).unwrap();
        board.place_piece(o(2), 5).unwrap();
        board.remove_piece(o(0)).unwrap();

        let x_player = board.player(Side::Initiator);
        let o_player = board.player(Side::Responder);
        assert_eq!(o_player.piece_count(), 2);
        assert!(GameRules::has_player_won(x_player, o_player, GamePhase::Movement, &board));
        assert!(GameRules::has_player_won(x_player, o_player, GamePhase::Capture, &board));
        assert!(!GameRules::has_player_won(x_player, o_player, GamePhase::Placement, &board));
    }

    #[test]
    fn test_has_player_won_by_blocking() {
        let mut board = board_with(18);
        board.place_piece(o(0), 0).unwrap();
        board.place_piece(x(0), 1).unwrap();
        board.place_piece(x(1), 9).unwrap();

        let x_player = board.player(Side::Initiator);
        let o_player = board.player(Side::Responder);
        assert!(GameRules::has_player_won(x_player, o_player, GamePhase::Movement, &board));
        // 吃子阶段不判定封堵
        assert!(!GameRules::has_player_won(x_player, o_player, GamePhase::Capture, &board));
        assert!(!GameRules::has_player_won(o_player, x_player, GamePhase::Movement, &board));
    }

    #[test]
    fn test_get_next_phase() {
        let mut board = board_with(2);
        let players = board.players().clone();
        assert_eq!(GameRules::get_next_phase(GamePhase::Placement, &players), GamePhase::Placement);

        board.place_piece(x(0), 0).unwrap();
        board.place_piece(o(0), 1).unwrap();
        let players = board.players().clone();
        assert_eq!(GameRules::get_next_phase(GamePhase::Placement, &players), GamePhase::Movement);
        assert_eq!(GameRules::get_next_phase(GamePhase::Capture, &players), GamePhase::Capture);
        assert_eq!(GameRules::get_next_phase(GamePhase::GameOver, &players), GamePhase::GameOver);
    }
}
