//! 对局状态机
//!
//! 阶段流转：落子 -> 走子 -> 吃子 -> {走子 | 落子} -> 结束。
//! 每一次成功的落子、走子或吃子都会推进一个回合，并把变更后的状态指纹记入账本。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::board::{Board, BoardOptions};
use crate::error::MorrisError;
use crate::hash::{fingerprint, SharedCrypto};
use crate::moves::{GameAction, Move, MoveGenerator};
use crate::piece::{CellId, PieceKey, PieceState, Side};
use crate::player::Player;
use crate::rules::GameRules;
use crate::snapshot::GameSnapshot;

/// 对局阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    /// 落子阶段
    Placement,
    /// 走子阶段
    Movement,
    /// 吃子阶段（成三后的临时阶段）
    Capture,
    /// 对局结束
    GameOver,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GamePhase::Placement => "placement",
            GamePhase::Movement => "movement",
            GamePhase::Capture => "capture",
            GamePhase::GameOver => "gameover",
        };
        f.write_str(name)
    }
}

/// 回合指纹账本
///
/// 每个已完成的回合恰好对应一条指纹。`begin` 与 `commit` 之间账本处于忙碌状态，
/// 此时开始新的回合属于逻辑错误。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnLedger {
    hashes: BTreeMap<u32, String>,
    pending: Option<u32>,
}

impl TurnLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始记录 `turn` 的指纹
    pub fn begin(&mut self, turn: u32) -> Result<(), MorrisError> {
        if let Some(pending) = self.pending {
            return Err(MorrisError::LedgerBusy { pending });
        }
        if let Some(expected) = self.next_turn() {
            if turn != expected {
                return Err(MorrisError::LedgerGap {
                    expected,
                    actual: turn,
                });
            }
        }
        self.pending = Some(turn);
        Ok(())
    }

    /// 写入正在等待的回合指纹，返回其回合号
    pub fn commit(&mut self, hash: String) -> Option<u32> {
        let turn = self.pending.take()?;
        self.hashes.insert(turn, hash);
        Some(turn)
    }

    /// 放弃正在等待的回合
    pub fn abort(&mut self) {
        self.pending = None;
    }

    /// 没有等待中的回合
    pub fn is_ready(&self) -> bool {
        self.pending.is_none()
    }

    /// 下一个应记录的回合号
    pub fn next_turn(&self) -> Option<u32> {
        self.hashes.keys().next_back().map(|turn| turn + 1)
    }

    /// 以单条记录重置账本（从快照恢复时使用）
    pub fn seed(&mut self, turn: u32, hash: String) {
        self.hashes.clear();
        self.pending = None;
        self.hashes.insert(turn, hash);
    }

    pub fn get(&self, turn: u32) -> Option<&str> {
        self.hashes.get(&turn).map(String::as_str)
    }

    /// 最近一条记录
    pub fn latest(&self) -> Option<(u32, &str)> {
        self.hashes
            .iter()
            .next_back()
            .map(|(turn, hash)| (*turn, hash.as_str()))
    }

    /// 指定回合的指纹是否与记录一致
    pub fn validate(&self, turn: u32, hash: &str) -> bool {
        self.get(turn) == Some(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// 对局
#[derive(Debug, Clone)]
pub struct Game {
    board: Board,
    current: Side,
    winner: Option<Side>,
    phase: GamePhase,
    turn: u32,
    ledger: TurnLedger,
    /// 本地玩家
    local: Side,
    selected_piece: Option<PieceKey>,
    valid_moves: Vec<CellId>,
    mill_to_remove: bool,
    removable_pieces: Vec<PieceKey>,
    crypto: SharedCrypto,
}

impl Game {
    /// 使用标准配置创建对局
    pub fn new(players: [Player; 2], local_player_id: &str, crypto: SharedCrypto) -> Result<Self, MorrisError> {
        Self::with_options(players, local_player_id, BoardOptions::default(), crypto)
    }

    /// 使用自定义棋盘配置创建对局（先手方会被排到 0 号位）
    pub fn with_options(
        players: [Player; 2],
        local_player_id: &str,
        options: BoardOptions,
        crypto: SharedCrypto,
    ) -> Result<Self, MorrisError> {
        let [first, second] = players;
        let players = if second.is_initiator() && !first.is_initiator() {
            [second, first]
        } else {
            [first, second]
        };

        let board = Board::new(players, options)?;
        let local = Self::side_of(&board, local_player_id)?;

        Ok(Self {
            board,
            current: Side::Initiator,
            winner: None,
            phase: GamePhase::Placement,
            turn: 0,
            ledger: TurnLedger::new(),
            local,
            selected_piece: None,
            valid_moves: Vec::new(),
            mill_to_remove: false,
            removable_pieces: Vec::new(),
            crypto,
        })
    }

    fn side_of(board: &Board, player_id: &str) -> Result<Side, MorrisError> {
        board
            .players()
            .iter()
            .find(|p| p.id() == player_id)
            .map(Player::side)
            .ok_or_else(|| MorrisError::UnknownPlayer(player_id.to_string()))
    }

    // ------------------------------------------------------------------
    // 查询
    // ------------------------------------------------------------------

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn players(&self) -> &[Player; 2] {
        self.board.players()
    }

    pub fn player(&self, side: Side) -> &Player {
        self.board.player(side)
    }

    pub fn current_side(&self) -> Side {
        self.current
    }

    pub fn current_player(&self) -> &Player {
        self.board.player(self.current)
    }

    /// 当前行动方的对手
    pub fn opponent(&self) -> &Player {
        self.board.player(self.current.opponent())
    }

    pub fn local_player(&self) -> &Player {
        self.board.player(self.local)
    }

    pub fn winner(&self) -> Option<&Player> {
        self.winner.map(|side| self.board.player(side))
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn ledger(&self) -> &TurnLedger {
        &self.ledger
    }

    pub fn crypto(&self) -> &SharedCrypto {
        &self.crypto
    }

    pub fn is_over(&self) -> bool {
        self.phase == GamePhase::GameOver
    }

    /// 是否轮到本地玩家
    pub fn is_my_turn(&self) -> bool {
        !self.is_over() && self.current == self.local
    }

    pub fn can_place_piece(&self) -> bool {
        self.phase == GamePhase::Placement && self.current_player().has_unplaced_pieces()
    }

    pub fn can_move_piece(&self) -> bool {
        self.phase == GamePhase::Movement
    }

    pub fn can_remove_piece(&self) -> bool {
        self.phase == GamePhase::Capture && self.mill_to_remove
    }

    pub fn selected_piece(&self) -> Option<PieceKey> {
        self.selected_piece
    }

    pub fn valid_moves(&self) -> &[CellId] {
        &self.valid_moves
    }

    pub fn mill_to_remove(&self) -> bool {
        self.mill_to_remove
    }

    pub fn removable_pieces(&self) -> &[PieceKey] {
        &self.removable_pieces
    }

    /// 当前行动方的所有合法走法
    pub fn legal_moves(&self) -> Vec<Move> {
        MoveGenerator::generate_legal(self)
    }

    // ------------------------------------------------------------------
    // 本地交互
    // ------------------------------------------------------------------

    /// 处理本地点击
    ///
    /// `Ok(None)` 表示什么都没有发生（不是本方回合或违反规则）；
    /// `Err` 表示内部状态不一致，调用方不应吞掉。
    pub fn handle_cell_click(&mut self, cell: CellId) -> Result<Option<Move>, MorrisError> {
        if !self.is_my_turn() {
            debug!(cell, "不是本方回合，忽略点击");
            return Ok(None);
        }
        self.handle_cell_click_forced(cell)
    }

    /// 处理点击，不检查是否轮到本地玩家
    pub fn handle_cell_click_forced(&mut self, cell: CellId) -> Result<Option<Move>, MorrisError> {
        if self.board.cell(cell).is_err() {
            return Ok(None);
        }

        match self.phase {
            GamePhase::GameOver => Ok(None),
            GamePhase::Placement => self.click_placement(cell),
            GamePhase::Movement => self.click_movement(cell),
            GamePhase::Capture => self.click_capture(cell),
        }
    }

    fn click_placement(&mut self, cell: CellId) -> Result<Option<Move>, MorrisError> {
        let target = self.board.cell(cell)?;
        if !GameRules::is_valid_placement(target, self.current_player(), self.phase) {
            return Ok(None);
        }
        self.execute_place(cell).map(Some)
    }

    fn click_movement(&mut self, cell: CellId) -> Result<Option<Move>, MorrisError> {
        if let Some(piece) = self.board.piece_at(cell) {
            if piece.owner() == self.current {
                self.selected_piece = Some(piece.key());
                self.valid_moves = GameRules::get_valid_moves_for_piece(piece, &self.board);
                return Ok(None);
            }
        }

        let Some(key) = self.selected_piece else {
            return Ok(None);
        };
        if !self.valid_moves.contains(&cell) {
            return Ok(None);
        }
        self.execute_move(key, cell).map(Some)
    }

    fn click_capture(&mut self, cell: CellId) -> Result<Option<Move>, MorrisError> {
        let Some(key) = self.board.piece_at(cell).map(|piece| piece.key()) else {
            return Ok(None);
        };
        if !self.removable_pieces.contains(&key) {
            return Ok(None);
        }
        self.execute_remove(key).map(Some)
    }

    // ------------------------------------------------------------------
    // 对端走法
    // ------------------------------------------------------------------

    /// 应用对端发来的走法
    ///
    /// 走法载荷不可信，所有合法性都会重新校验；失败时返回 false 且状态不变。
    pub fn apply_move(&mut self, mv: &Move) -> bool {
        match self.try_apply_move(mv) {
            Ok(()) => true,
            Err(e) => {
                warn!(turn = self.turn, mv = %mv, error = %e, "拒绝对端走法");
                false
            }
        }
    }

    fn try_apply_move(&mut self, mv: &Move) -> Result<(), MorrisError> {
        if self.is_over() {
            return Err(MorrisError::GameOver);
        }
        if self.current_player().id() != mv.player_id {
            return Err(MorrisError::NotYourTurn);
        }

        let required = match mv.action {
            GameAction::Place => GamePhase::Placement,
            GameAction::Move => GamePhase::Movement,
            GameAction::Remove => GamePhase::Capture,
        };
        if self.phase != required {
            return Err(MorrisError::WrongPhase {
                action: format!("{:?}", mv.action),
                phase: self.phase.to_string(),
            });
        }

        let to = mv.to_cell_id;
        match mv.action {
            GameAction::Place => {
                let player = self.current_player();
                if !GameRules::is_valid_placement(self.board.cell(to)?, player, self.phase) {
                    return Err(MorrisError::InvalidPlacement(to));
                }
                let next = player.next_piece().map(|key| key.id);
                if mv.piece_id.is_some() && mv.piece_id != next {
                    return Err(MorrisError::InvalidPlacement(to));
                }
                self.execute_place(to)?;
            }
            GameAction::Move => {
                let from = mv.from_cell_id.ok_or(MorrisError::MissingField("fromCellId"))?;
                let piece = self
                    .board
                    .piece_at(from)
                    .filter(|piece| piece.owner() == self.current)
                    .ok_or(MorrisError::NoPiece(from))?;
                if mv.piece_id.is_some_and(|id| id != piece.id()) {
                    return Err(MorrisError::NoPiece(from));
                }
                if !GameRules::get_valid_moves_for_piece(piece, &self.board).contains(&to) {
                    return Err(MorrisError::InvalidMove {
                        from: Some(from),
                        to,
                    });
                }
                let key = piece.key();
                self.execute_move(key, to)?;
            }
            GameAction::Remove => {
                let piece = self.board.piece_at(to).ok_or(MorrisError::NoPiece(to))?;
                if mv.removed_piece_id.is_some_and(|id| id != piece.id()) {
                    return Err(MorrisError::NoPiece(to));
                }
                if !GameRules::is_valid_removal(piece, self.current_player(), &self.board) {
                    return Err(MorrisError::InvalidRemoval(to));
                }
                let key = piece.key();
                self.execute_remove(key)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // 状态变更
    // ------------------------------------------------------------------

    fn execute_place(&mut self, cell: CellId) -> Result<Move, MorrisError> {
        let player = self.current_player();
        let key = player.next_piece().ok_or(MorrisError::InvalidPlacement(cell))?;
        let mv = Move::place(player.id(), key.id, cell);

        self.board.place_piece(key, cell)?;
        self.after_arrival(cell)?;
        Ok(mv)
    }

    fn execute_move(&mut self, key: PieceKey, to: CellId) -> Result<Move, MorrisError> {
        let from = self
            .board
            .piece(key)?
            .cell()
            .ok_or(MorrisError::InvalidMove { from: None, to })?;
        let mv = Move::movement(self.current_player().id(), key.id, from, to);

        if self.board.can_fly(key.owner) {
            self.board.fly_piece(key, to)?;
        } else {
            self.board.move_piece(key, to)?;
        }
        self.selected_piece = None;
        self.valid_moves.clear();

        self.after_arrival(to)?;
        Ok(mv)
    }

    fn execute_remove(&mut self, key: PieceKey) -> Result<Move, MorrisError> {
        let piece = self.board.piece(key)?;
        let cell = piece.cell().ok_or(MorrisError::PieceUnavailable {
            id: piece.id(),
            state: piece.state(),
            action: "removed",
        })?;
        let mv = Move::removal(self.current_player().id(), cell, key.id);

        self.board.remove_piece(key)?;
        self.mill_to_remove = false;
        self.removable_pieces.clear();

        let mover = self.current;
        let resumed = if self.board.players().iter().any(Player::has_unplaced_pieces) {
            GamePhase::Placement
        } else {
            GamePhase::Movement
        };

        let (player, opponent) = (self.board.player(mover), self.board.player(mover.opponent()));
        let won = GameRules::has_player_won(player, opponent, GamePhase::Capture, &self.board)
            || (resumed == GamePhase::Movement
                && GameRules::has_player_won(player, opponent, GamePhase::Movement, &self.board));

        if won {
            self.declare_winner(mover);
        } else {
            self.phase = resumed;
            self.current = mover.opponent();
        }

        self.advance_turn()?;
        Ok(mv)
    }

    /// 落子或走子之后：检查成三，否则结束本回合
    fn after_arrival(&mut self, cell: CellId) -> Result<(), MorrisError> {
        if self.board.check_for_mill(cell) {
            let removable = GameRules::get_removable_pieces(self.opponent(), &self.board);
            if !removable.is_empty() {
                debug!(cell, count = removable.len(), "成三，进入吃子阶段");
                self.phase = GamePhase::Capture;
                self.mill_to_remove = true;
                self.removable_pieces = removable;
                return self.advance_turn();
            }
            debug!(cell, "成三但对方棋盘上无子，跳过吃子");
        }

        self.phase = GameRules::get_next_phase(self.phase, self.board.players());

        let mover = self.current;
        if GameRules::has_player_won(
            self.board.player(mover),
            self.board.player(mover.opponent()),
            self.phase,
            &self.board,
        ) {
            self.declare_winner(mover);
        } else {
            self.current = mover.opponent();
        }

        self.advance_turn()
    }

    fn declare_winner(&mut self, side: Side) {
        self.winner = Some(side);
        self.phase = GamePhase::GameOver;
        self.selected_piece = None;
        self.valid_moves.clear();
        self.board.player_mut(side).set_winner(true);
        info!(winner = self.board.player(side).id(), turn = self.turn, "对局结束");
    }

    /// 推进回合并记录变更后的状态指纹
    fn advance_turn(&mut self) -> Result<(), MorrisError> {
        let completed = self.turn;
        self.ledger.begin(completed)?;
        self.turn += 1;

        match self.state_hash() {
            Ok(hash) => {
                debug!(turn = completed, hash = %hash, "记录回合指纹");
                self.ledger.commit(hash);
                Ok(())
            }
            Err(e) => {
                self.ledger.abort();
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // 快照
    // ------------------------------------------------------------------

    /// 当前状态的指纹
    pub fn state_hash(&self) -> Result<String, MorrisError> {
        Ok(fingerprint(self.crypto.as_ref(), &self.dehydrate()?))
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let [first, second] = self.board.players();
        GameSnapshot {
            players: [first.snapshot(), second.snapshot()],
            current_player_id: self.current_player().id().to_string(),
            winner: self.winner().map(|p| p.id().to_string()),
            turn: self.turn,
            phase: self.phase,
        }
    }

    /// 序列化为 JSON
    pub fn dehydrate(&self) -> Result<String, MorrisError> {
        Ok(self.snapshot().to_json()?)
    }

    /// 从 JSON 快照恢复
    pub fn rehydrate(
        data: &str,
        local_player_id: &str,
        options: BoardOptions,
        crypto: SharedCrypto,
    ) -> Result<Self, MorrisError> {
        let snapshot = GameSnapshot::from_json(data)?;
        Self::from_snapshot(&snapshot, local_player_id, options, crypto)
    }

    /// 从快照恢复
    pub fn from_snapshot(
        snapshot: &GameSnapshot,
        local_player_id: &str,
        options: BoardOptions,
        crypto: SharedCrypto,
    ) -> Result<Self, MorrisError> {
        let [first, second] = &snapshot.players;
        let players = [
            Player::new(first.id.clone(), first.name.clone(), true),
            Player::new(second.id.clone(), second.name.clone(), false),
        ];
        let mut board = Board::new(players, options)?;

        for (side, saved) in [(Side::Initiator, first), (Side::Responder, second)] {
            if saved.pieces.len() != board.player(side).pieces().len() {
                return Err(MorrisError::Snapshot(format!(
                    "player {} has {} pieces, board expects {}",
                    saved.id,
                    saved.pieces.len(),
                    board.player(side).pieces().len()
                )));
            }

            for (id, piece) in saved.pieces.iter().enumerate() {
                let key = PieceKey::new(side, id as u8);
                match (piece.state, piece.cell_id) {
                    (PieceState::Unplaced, None) => {}
                    (PieceState::Placed, Some(cell)) => board.place_piece(key, cell)?,
                    (PieceState::Removed, None) => board.discard_piece(key)?,
                    _ => {
                        return Err(MorrisError::Snapshot(format!(
                            "piece {} of {} is {:?} at {:?}",
                            id, saved.id, piece.state, piece.cell_id
                        )))
                    }
                }
            }

            board.player_mut(side).set_winner(saved.is_winner);
        }

        let current = Self::side_of(&board, &snapshot.current_player_id)?;
        let winner = match snapshot.winner.as_deref() {
            Some(id) => Some(Self::side_of(&board, id)?),
            None => None,
        };
        let local = Self::side_of(&board, local_player_id)?;

        if winner.is_some() != (snapshot.phase == GamePhase::GameOver) {
            return Err(MorrisError::Snapshot(format!(
                "winner {:?} does not match phase {}",
                snapshot.winner, snapshot.phase
            )));
        }

        let mut game = Self {
            board,
            current,
            winner,
            phase: snapshot.phase,
            turn: snapshot.turn,
            ledger: TurnLedger::new(),
            local,
            selected_piece: None,
            valid_moves: Vec::new(),
            mill_to_remove: false,
            removable_pieces: Vec::new(),
            crypto,
        };

        if game.phase == GamePhase::Capture {
            game.removable_pieces = GameRules::get_removable_pieces(game.opponent(), &game.board);
            game.mill_to_remove = true;
        }
        if game.turn > 0 {
            let hash = game.state_hash()?;
            game.ledger.seed(game.turn - 1, hash);
        }

        Ok(game)
    }

    /// 用快照整体替换当前状态（本地玩家与棋盘配置不变）
    pub fn load_snapshot(&mut self, snapshot: &GameSnapshot) -> Result<(), MorrisError> {
        let local_id = self.local_player().id().to_string();
        *self = Self::from_snapshot(snapshot, &local_id, *self.board.options(), self.crypto.clone())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Sha256Crypto;

    fn game_with(pieces: usize, local: &str) -> Game {
        Game::with_options(
            [Player::new("x", "X", true), Player::new("o", "O", false)],
            local,
            BoardOptions {
                pieces,
                ..Default::default()
            },
            Sha256Crypto::shared(),
        )
        .unwrap()
    }

    fn click(game: &mut Game, cell: CellId) -> Option<Move> {
        game.handle_cell_click_forced(cell).unwrap()
    }

    fn play(game: &mut Game, cells: &[CellId]) {
        for &cell in cells {
            assert!(click(game, cell).is_some(), "click on {} did nothing", cell);
        }
    }

    fn x(id: u8) -> PieceKey {
        PieceKey::new(Side::Initiator, id)
    }

    fn o(id: u8) -> PieceKey {
        PieceKey::new(Side::Responder, id)
    }

    #[test]
    fn test_new_game() {
        let game = game_with(18, "x");
        assert_eq!(game.phase(), GamePhase::Placement);
        assert_eq!(game.turn(), 0);
        assert!(game.ledger().is_empty());
        assert_eq!(game.current_player().id(), "x");
        assert!(game.is_my_turn());
        assert!(game.can_place_piece());
        assert_eq!(game.legal_moves().len(), 24);
    }

    #[test]
    fn test_initiator_moved_to_first_slot() {
        let game = Game::new(
            [Player::new("o", "O", false), Player::new("x", "X", true)],
            "o",
            Sha256Crypto::shared(),
        )
        .unwrap();
        assert_eq!(game.players()[0].id(), "x");
        assert_eq!(game.local_player().id(), "o");
        assert!(!game.is_my_turn());
    }

    #[test]
    fn test_unknown_local_player() {
        let result = Game::new(
            [Player::new("x", "X", true), Player::new("o", "O", false)],
            "z",
            Sha256Crypto::shared(),
        );
        assert!(matches!(result, Err(MorrisError::UnknownPlayer(_))));
    }

    #[test]
    fn test_placement_records_hash() {
        let mut game = game_with(18, "x");
        let mv = game.handle_cell_click(0).unwrap().unwrap();

        assert_eq!(mv, Move::place("x", 0, 0));
        assert_eq!(game.turn(), 1);
        assert_eq!(game.current_player().id(), "o");
        assert_eq!(game.ledger().len(), 1);
        assert_eq!(game.ledger().get(0), Some(game.state_hash().unwrap().as_str()));
        assert!(game.ledger().is_ready());
    }

    #[test]
    fn test_click_when_not_my_turn() {
        let mut game = game_with(18, "x");
        game.handle_cell_click(0).unwrap();

        assert_eq!(game.handle_cell_click(3).unwrap(), None);
        assert_eq!(game.turn(), 1);
        // 强制点击跳过回合检查
        assert!(game.handle_cell_click_forced(3).unwrap().is_some());
    }

    #[test]
    fn test_invalid_clicks_are_noops() {
        let mut game = game_with(18, "x");
        play(&mut game, &[0]);

        assert_eq!(click(&mut game, 0), None);
        assert_eq!(click(&mut game, 99), None);
        assert_eq!(game.turn(), 1);
        assert_eq!(game.ledger().len(), 1);
    }

    #[test]
    fn test_mill_enters_capture() {
        let mut game = game_with(18, "x");
        play(&mut game, &[0, 3, 1, 4, 2]);

        assert_eq!(game.phase(), GamePhase::Capture);
        assert!(game.mill_to_remove());
        assert!(game.can_remove_piece());
        assert_eq!(game.removable_pieces(), &[o(0), o(1)]);
        assert_eq!(game.current_player().id(), "x");
        assert_eq!(game.turn(), 5);
        assert_eq!(game.ledger().len(), 5);
        assert_eq!(game.legal_moves().len(), 2);
    }

    #[test]
    fn test_capture_resumes_placement() {
        let mut game = game_with(18, "x");
        play(&mut game, &[0, 3, 1, 4, 2]);

        // 点自己的棋子或空格没有效果
        assert_eq!(click(&mut game, 0), None);
        assert_eq!(click(&mut game, 5), None);

        let mv = click(&mut game, 3).unwrap();
        assert_eq!(mv, Move::removal("x", 3, 0));
        assert_eq!(game.phase(), GamePhase::Placement);
        assert!(!game.mill_to_remove());
        assert!(game.removable_pieces().is_empty());
        assert_eq!(game.current_player().id(), "o");
        assert_eq!(game.turn(), 6);
        assert_eq!(game.player(Side::Responder).piece_count(), 8);
    }

    #[test]
    fn test_capture_wins_game() {
        let mut game = game_with(6, "x");
        play(&mut game, &[0, 3, 1, 4, 2]);
        assert_eq!(game.phase(), GamePhase::Capture);

        click(&mut game, 3).unwrap();
        assert_eq!(game.phase(), GamePhase::GameOver);
        assert_eq!(game.winner().map(Player::id), Some("x"));
        assert!(game.player(Side::Initiator).is_winner());
        assert_eq!(game.turn(), 6);
        assert_eq!(game.ledger().len(), 6);

        assert_eq!(click(&mut game, 5), None);
        assert!(game.legal_moves().is_empty());
        assert!(!game.is_my_turn());
    }

    #[test]
    fn test_mill_without_removable_pieces() {
        let fresh = game_with(8, "x");
        let mut snapshot = fresh.snapshot();
        for (id, cell) in [(0, 0), (1, 1)] {
            snapshot.players[0].pieces[id].state = PieceState::Placed;
            snapshot.players[0].pieces[id].cell_id = Some(cell);
        }
        snapshot.turn = 2;

        let mut game = Game::from_snapshot(&snapshot, "x", *fresh.board().options(), Sha256Crypto::shared()).unwrap();
        play(&mut game, &[2]);

        assert!(game.board().check_for_mill(2));
        assert_eq!(game.phase(), GamePhase::Placement);
        assert_eq!(game.current_player().id(), "o");
        assert_eq!(game.turn(), 3);
    }

    #[test]
    fn test_movement_phase() {
        let mut game = game_with(8, "x");
        play(&mut game, &[0, 3, 1, 4, 9, 10, 23, 22]);

        assert_eq!(game.phase(), GamePhase::Movement);
        assert_eq!(game.current_player().id(), "x");
        assert_eq!(game.turn(), 8);

        // 未选子时点空格无效
        assert_eq!(click(&mut game, 5), None);

        assert_eq!(click(&mut game, 1), None);
        assert_eq!(game.selected_piece(), Some(x(1)));
        assert_eq!(game.valid_moves(), &[2]);

        // 改选另一枚棋子
        assert_eq!(click(&mut game, 23), None);
        assert_eq!(game.selected_piece(), Some(x(3)));
        assert_eq!(game.valid_moves(), &[14]);

        // 非法目标
        assert_eq!(click(&mut game, 2), None);

        click(&mut game, 1);
        let mv = click(&mut game, 2).unwrap();
        assert_eq!(mv, Move::movement("x", 1, 1, 2));
        assert_eq!(game.selected_piece(), None);
        assert_eq!(game.turn(), 9);
        assert_eq!(game.current_player().id(), "o");
        assert_eq!(game.board().piece_at(2).map(|p| p.key()), Some(x(1)));
    }

    #[test]
    fn test_flying_move() {
        let mut game = game_with(6, "x");
        play(&mut game, &[0, 3, 1, 4, 9, 23]);
        assert_eq!(game.phase(), GamePhase::Movement);

        click(&mut game, 0);
        assert_eq!(game.valid_moves().len(), 18);

        let mv = click(&mut game, 22).unwrap();
        assert_eq!(mv, Move::movement("x", 0, 0, 22));
        assert_eq!(game.turn(), 7);
    }

    #[test]
    fn test_apply_move_mirrors_state() {
        let mut host = game_with(18, "x");
        let mut guest = game_with(18, "o");

        for (cell, by_host) in [(0, true), (3, false), (1, true), (4, false), (2, true), (3, true)] {
            let (actor, mirror) = if by_host {
                (&mut host, &mut guest)
            } else {
                (&mut guest, &mut host)
            };
            let mv = actor.handle_cell_click(cell).unwrap().unwrap();
            assert!(mirror.apply_move(&mv), "mirror rejected {}", mv);
            assert_eq!(actor.state_hash().unwrap(), mirror.state_hash().unwrap());
        }

        assert_eq!(host.phase(), GamePhase::Placement);
        assert_eq!(host.turn(), 6);
        assert_eq!(host.ledger(), guest.ledger());
    }

    #[test]
    fn test_apply_move_rejects_illegal() {
        let mut host = game_with(18, "x");
        let mut guest = game_with(18, "o");

        let mv = host.handle_cell_click(0).unwrap().unwrap();
        assert!(guest.apply_move(&mv));
        let hash = guest.state_hash().unwrap();

        // 重放同一步
        assert!(!guest.apply_move(&mv));
        // 落在已占用的格点
        assert!(!guest.apply_move(&Move::place("o", 0, 0)));
        // 阶段不符
        assert!(!guest.apply_move(&Move::movement("o", 0, 3, 4)));
        assert!(!guest.apply_move(&Move::removal("o", 0, 0)));
        // 棋子编号不符
        assert!(!guest.apply_move(&Move::place("o", 5, 3)));

        assert_eq!(guest.turn(), 1);
        assert_eq!(guest.state_hash().unwrap(), hash);
    }

    #[test]
    fn test_apply_move_rechecks_removability() {
        let mut game = game_with(18, "x");
        // o 在第 1 行成三并吃掉 9 上的 x
        play(&mut game, &[0, 3, 1, 4, 9, 5, 9]);
        // x 落 21，o 落 23，x 在第 0 行成三
        play(&mut game, &[21, 23, 2]);
        assert_eq!(game.phase(), GamePhase::Capture);
        assert_eq!(game.removable_pieces(), &[o(3)]);

        assert!(!game.apply_move(&Move::removal("x", 3, 0)));
        assert!(!game.apply_move(&Move::removal("x", 23, 0)));
        assert!(game.apply_move(&Move::removal("x", 23, 3)));
        assert_eq!(game.phase(), GamePhase::Placement);
    }

    #[test]
    fn test_dehydrate_round_trip() {
        let mut game = game_with(18, "x");
        play(&mut game, &[0, 3, 1, 4]);

        let data = game.dehydrate().unwrap();
        let restored = Game::rehydrate(&data, "o", BoardOptions::default(), Sha256Crypto::shared()).unwrap();

        assert_eq!(restored.turn(), game.turn());
        assert_eq!(restored.current_player().id(), game.current_player().id());
        assert_eq!(restored.local_player().id(), "o");
        for (restored_cell, cell) in restored.board().cells().zip(game.board().cells()) {
            assert_eq!(restored_cell.piece(), cell.piece());
        }
        assert_eq!(restored.state_hash().unwrap(), game.state_hash().unwrap());
        assert_eq!(restored.ledger().latest(), game.ledger().latest());
    }

    #[test]
    fn test_rehydrate_capture_phase() {
        let mut game = game_with(18, "x");
        play(&mut game, &[0, 3, 1, 4, 2]);

        let mut restored = game_with(18, "o");
        restored.load_snapshot(&game.snapshot()).unwrap();

        assert_eq!(restored.phase(), GamePhase::Capture);
        assert!(restored.mill_to_remove());
        assert_eq!(restored.removable_pieces(), game.removable_pieces());
        assert_eq!(restored.local_player().id(), "o");

        let mv = click(&mut game, 4).unwrap();
        assert!(restored.apply_move(&mv));
        assert_eq!(restored.state_hash().unwrap(), game.state_hash().unwrap());
    }

    #[test]
    fn test_rehydrate_rejects_inconsistent_snapshot() {
        let game = game_with(18, "x");
        let options = BoardOptions::default();

        let mut snapshot = game.snapshot();
        snapshot.players[1].pieces.pop();
        assert!(matches!(
            Game::from_snapshot(&snapshot, "x", options, Sha256Crypto::shared()),
            Err(MorrisError::Snapshot(_))
        ));

        let mut snapshot = game.snapshot();
        snapshot.players[0].pieces[0].state = PieceState::Placed;
        assert!(Game::from_snapshot(&snapshot, "x", options, Sha256Crypto::shared()).is_err());

        let mut snapshot = game.snapshot();
        snapshot.winner = Some("x".to_string());
        assert!(Game::from_snapshot(&snapshot, "x", options, Sha256Crypto::shared()).is_err());

        assert!(Game::rehydrate("{not json", "x", options, Sha256Crypto::shared()).is_err());
    }

    #[test]
    fn test_state_hash_tracks_state() {
        let mut a = game_with(18, "x");
        let mut b = game_with(18, "x");
        assert_eq!(a.state_hash().unwrap(), b.state_hash().unwrap());

        play(&mut a, &[0]);
        play(&mut b, &[1]);
        assert_ne!(a.state_hash().unwrap(), b.state_hash().unwrap());
    }

    #[test]
    fn test_ledger_ready_gate() {
        let mut ledger = TurnLedger::new();
        ledger.begin(0).unwrap();
        assert!(!ledger.is_ready());
        assert_eq!(ledger.begin(1), Err(MorrisError::LedgerBusy { pending: 0 }));

        assert_eq!(ledger.commit("h0".to_string()), Some(0));
        assert_eq!(ledger.begin(2), Err(MorrisError::LedgerGap { expected: 1, actual: 2 }));
        ledger.begin(1).unwrap();
        ledger.commit("h1".to_string());

        assert_eq!(ledger.latest(), Some((1, "h1")));
        assert!(ledger.validate(0, "h0"));
        assert!(!ledger.validate(1, "h0"));
        assert_eq!(ledger.commit("stray".to_string()), None);
    }
}
