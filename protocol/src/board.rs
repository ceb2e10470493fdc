//! 棋盘表示
//!
//! 棋盘是格点组成的无向图，外加双方玩家的棋子池。
//! 所有变更操作都先完成校验再修改状态，失败时棋盘保持不变。

use serde::{Deserialize, Serialize};

use crate::constants::{
    FLYING_THRESHOLD, MILL_SIZE, PLAYER_COUNT, STANDARD_CELL_COUNT, STANDARD_PIECE_COUNT,
};
use crate::error::MorrisError;
use crate::graph::Graph;
use crate::piece::{Cell, CellId, GamePiece, PieceKey, PieceState, Side};
use crate::player::Player;
use crate::snapshot::BoardSnapshot;

/// 标准棋盘格点坐标（7x7 网格，按行优先排列，下标即格点 ID）
const STANDARD_CELLS: [(u8, u8); STANDARD_CELL_COUNT] = [
    (0, 0), (0, 3), (0, 6),
    (1, 1), (1, 3), (1, 5),
    (2, 2), (2, 3), (2, 4),
    (3, 0), (3, 1), (3, 2), (3, 4), (3, 5), (3, 6),
    (4, 2), (4, 3), (4, 4),
    (5, 1), (5, 3), (5, 5),
    (6, 0), (6, 3), (6, 6),
];

/// 标准棋盘连线：源坐标 -> 目标坐标列表
const STANDARD_EDGES: &[((u8, u8), &[(u8, u8)])] = &[
    ((0, 0), &[(0, 3), (3, 0)]),
    ((0, 3), &[(0, 6), (1, 3)]),
    ((0, 6), &[(3, 6)]),
    ((1, 1), &[(1, 3), (3, 1)]),
    ((1, 3), &[(1, 5), (2, 3)]),
    ((1, 5), &[(3, 5)]),
    ((2, 2), &[(2, 3), (3, 2)]),
    ((2, 3), &[(2, 4)]),
    ((2, 4), &[(3, 4)]),
    ((3, 0), &[(3, 1), (6, 0)]),
    ((3, 1), &[(3, 2), (5, 1)]),
    ((3, 2), &[(4, 2)]),
    ((3, 4), &[(3, 5), (4, 4)]),
    ((3, 5), &[(3, 6), (5, 5)]),
    ((3, 6), &[(6, 6)]),
    ((4, 2), &[(4, 3)]),
    ((4, 3), &[(4, 4), (5, 3)]),
    ((5, 1), &[(5, 3)]),
    ((5, 3), &[(5, 5), (6, 3)]),
    ((6, 0), &[(6, 3)]),
    ((6, 3), &[(6, 6)]),
];

/// 棋盘配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardOptions {
    /// 格点数
    pub cells: usize,
    /// 棋子总数（双方合计，必须为偶数）
    pub pieces: usize,
    /// 成三所需连子数
    pub mill_size: usize,
    /// 是否允许飞子
    pub fly: bool,
    /// 飞子阈值
    pub fly_at: usize,
}

impl Default for BoardOptions {
    fn default() -> Self {
        Self {
            cells: STANDARD_CELL_COUNT,
            pieces: STANDARD_PIECE_COUNT,
            mill_size: MILL_SIZE,
            fly: true,
            fly_at: FLYING_THRESHOLD,
        }
    }
}

impl BoardOptions {
    /// 每方棋子数
    pub fn pieces_per_player(&self) -> usize {
        self.pieces / PLAYER_COUNT
    }
}

/// 构造标准九子棋拓扑
pub fn standard_graph() -> Result<Graph<Cell>, MorrisError> {
    let mut graph = Graph::with_vertices(
        STANDARD_CELLS
            .iter()
            .enumerate()
            .map(|(id, &(row, col))| Cell::new(id, row, col))
            .collect(),
    );

    for &((row, col), destinations) in STANDARD_EDGES {
        graph.add_edges_by_filter(
            |c: &Cell| c.row == row && c.col == col,
            |c: &Cell| destinations.contains(&(c.row, c.col)),
        )?;
    }

    Ok(graph)
}

/// 棋盘
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    graph: Graph<Cell>,
    players: [Player; 2],
    options: BoardOptions,
}

impl Board {
    /// 使用标准拓扑创建棋盘
    pub fn new(players: [Player; 2], options: BoardOptions) -> Result<Self, MorrisError> {
        Self::with_graph(standard_graph()?, players, options)
    }

    /// 使用自定义拓扑创建棋盘
    pub fn with_graph(
        graph: Graph<Cell>,
        mut players: [Player; 2],
        options: BoardOptions,
    ) -> Result<Self, MorrisError> {
        if options.pieces % PLAYER_COUNT != 0 {
            return Err(MorrisError::InvalidBoard {
                reason: format!("piece count {} is not divisible by {}", options.pieces, PLAYER_COUNT),
            });
        }
        if options.pieces_per_player() > u8::MAX as usize {
            return Err(MorrisError::InvalidBoard {
                reason: format!("piece count {} is too large", options.pieces),
            });
        }
        if graph.len() != options.cells {
            return Err(MorrisError::InvalidBoard {
                reason: format!("expected {} cells, graph has {}", options.cells, graph.len()),
            });
        }
        if let Some((id, _)) = graph.vertices().find(|(id, cell)| cell.id != *id || !cell.is_empty()) {
            return Err(MorrisError::InvalidBoard {
                reason: format!("cell at vertex {} is inconsistent", id),
            });
        }
        if !players[0].is_initiator() || players[1].is_initiator() {
            return Err(MorrisError::InvalidPlayers {
                reason: "exactly one initiator is required in slot 0".to_string(),
            });
        }
        if players[0].id() == players[1].id() {
            return Err(MorrisError::InvalidPlayers {
                reason: format!("duplicate player id {}", players[0].id()),
            });
        }

        for player in players.iter_mut() {
            player.reset_pieces(options.pieces_per_player());
        }

        Ok(Self {
            graph,
            players,
            options,
        })
    }

    pub fn options(&self) -> &BoardOptions {
        &self.options
    }

    pub fn graph(&self) -> &Graph<Cell> {
        &self.graph
    }

    pub fn players(&self) -> &[Player; 2] {
        &self.players
    }

    pub fn player(&self, side: Side) -> &Player {
        &self.players[side.index()]
    }

    pub(crate) fn player_mut(&mut self, side: Side) -> &mut Player {
        &mut self.players[side.index()]
    }

    /// 按 ID 获取格点
    pub fn cell(&self, id: CellId) -> Result<&Cell, MorrisError> {
        self.graph.vertex(id).ok_or(MorrisError::InvalidCell(id))
    }

    /// 按坐标获取格点
    pub fn cell_at(&self, row: u8, col: u8) -> Option<&Cell> {
        self.graph
            .filter(|c| c.row == row && c.col == col)
            .first()
            .and_then(|&id| self.graph.vertex(id))
    }

    /// 遍历所有格点
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.graph.vertices().map(|(_, cell)| cell)
    }

    /// 所有空格点
    pub fn empty_cells(&self) -> Vec<CellId> {
        self.graph.filter(Cell::is_empty)
    }

    /// 两个格点是否相邻
    pub fn is_adjacent(&self, from: CellId, to: CellId) -> bool {
        self.graph.is_adjacent(from, to)
    }

    /// 相邻格点
    pub fn neighbors(&self, id: CellId) -> Result<&[CellId], MorrisError> {
        Ok(self.graph.neighbors(id)?)
    }

    pub fn piece(&self, key: PieceKey) -> Result<&GamePiece, MorrisError> {
        self.player(key.owner)
            .piece(key.id)
            .ok_or(MorrisError::UnknownPiece {
                owner: key.owner,
                id: key.id,
            })
    }

    fn piece_mut(&mut self, key: PieceKey) -> Result<&mut GamePiece, MorrisError> {
        self.player_mut(key.owner)
            .piece_mut(key.id)
            .ok_or(MorrisError::UnknownPiece {
                owner: key.owner,
                id: key.id,
            })
    }

    /// 格点上的棋子
    pub fn piece_at(&self, cell: CellId) -> Option<&GamePiece> {
        let key = self.graph.vertex(cell)?.piece()?;
        self.piece(key).ok()
    }

    /// 该阵营当前是否满足飞子条件
    pub fn can_fly(&self, side: Side) -> bool {
        self.options.fly && self.player(side).piece_count() <= self.options.fly_at
    }

    fn vacant_cell(&self, id: CellId) -> Result<&Cell, MorrisError> {
        let cell = self.cell(id)?;
        if !cell.is_empty() {
            return Err(MorrisError::CellOccupied(id));
        }
        Ok(cell)
    }

    fn placed_cell(&self, key: PieceKey, action: &'static str) -> Result<CellId, MorrisError> {
        let piece = self.piece(key)?;
        piece.cell().filter(|_| piece.is_placed()).ok_or(MorrisError::PieceUnavailable {
            id: piece.id(),
            state: piece.state(),
            action,
        })
    }

    fn cell_mut(&mut self, id: CellId) -> Result<&mut Cell, MorrisError> {
        self.graph.vertex_mut(id).ok_or(MorrisError::InvalidCell(id))
    }

    /// 落子
    pub fn place_piece(&mut self, key: PieceKey, cell: CellId) -> Result<(), MorrisError> {
        self.vacant_cell(cell)?;
        let piece = self.piece(key)?;
        if piece.state() != PieceState::Unplaced {
            return Err(MorrisError::PieceUnavailable {
                id: piece.id(),
                state: piece.state(),
                action: "placed",
            });
        }

        self.cell_mut(cell)?.occupy(key)?;
        self.piece_mut(key)?.place(cell)
    }

    /// 沿连线移动到相邻空格
    pub fn move_piece(&mut self, key: PieceKey, to: CellId) -> Result<(), MorrisError> {
        let from = self.placed_cell(key, "moved")?;
        self.vacant_cell(to)?;
        if !self.graph.is_adjacent(from, to) {
            return Err(MorrisError::InvalidMove {
                from: Some(from),
                to,
            });
        }
        self.relocate(key, from, to)
    }

    /// 飞到任意空格
    pub fn fly_piece(&mut self, key: PieceKey, to: CellId) -> Result<(), MorrisError> {
        let from = self.placed_cell(key, "moved")?;
        if !self.can_fly(key.owner) {
            return Err(MorrisError::InvalidMove {
                from: Some(from),
                to,
            });
        }
        self.vacant_cell(to)?;
        self.relocate(key, from, to)
    }

    fn relocate(&mut self, key: PieceKey, from: CellId, to: CellId) -> Result<(), MorrisError> {
        self.cell_mut(from)?.vacate()?;
        self.cell_mut(to)?.occupy(key)?;
        self.piece_mut(key)?.relocate(to)
    }

    /// 吃掉棋子
    pub fn remove_piece(&mut self, key: PieceKey) -> Result<(), MorrisError> {
        let cell = self.placed_cell(key, "removed")?;
        self.cell_mut(cell)?.vacate()?;
        self.piece_mut(key)?.remove()
    }

    /// 从快照恢复时把未落子的棋子直接标记为已吃掉
    pub(crate) fn discard_piece(&mut self, key: PieceKey) -> Result<(), MorrisError> {
        self.piece_mut(key)?.discard()
    }

    /// 检查刚落到 `cell` 的棋子是否成三
    pub fn check_for_mill(&self, cell: CellId) -> bool {
        let Some(origin) = self.graph.vertex(cell) else {
            return false;
        };
        let Some(owner) = origin.piece().map(|p| p.owner) else {
            return false;
        };
        let (row, col) = (origin.row, origin.col);

        let run = match self.graph.contiguous_breadth_first_search(
            cell,
            |c| c.piece().map(|p| p.owner) == Some(owner) && (c.row == row || c.col == col),
            true,
        ) {
            Ok(run) => run,
            Err(_) => return false,
        };

        let mill = self.options.mill_size;
        if run.len() < mill {
            return false;
        }

        let cells: Vec<&Cell> = run.iter().filter_map(|&id| self.graph.vertex(id)).collect();
        let in_row = cells.iter().filter(|c| c.row == row).count();
        let in_col = cells.iter().filter(|c| c.col == col).count();
        in_row >= mill || in_col >= mill
    }

    /// 生成棋盘快照
    pub fn snapshot(&self) -> BoardSnapshot<'_> {
        BoardSnapshot {
            players: self.players.iter().map(Player::snapshot).collect(),
            graph: self.graph.snapshot(),
            mill_count: self.options.mill_size,
            piece_count: self.options.pieces,
            cell_count: self.options.cells,
        }
    }

    /// 序列化为 JSON
    pub fn dehydrate(&self) -> Result<String, MorrisError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }
}
