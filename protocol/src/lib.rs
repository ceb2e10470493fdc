//! 九子棋共享协议库
//!
//! 包含:
//! - 通用图结构与棋盘拓扑
//! - 棋子、格点、玩家等核心数据结构
//! - 规则判定与合法走法生成
//! - 对局状态机与回合指纹账本
//! - 对局快照格式
//! - 对端消息定义与帧格式
//! - 传输层：TCP 与进程内通道

mod board;
mod constants;
mod error;
mod game;
mod graph;
mod hash;
mod message;
mod moves;
mod piece;
mod player;
mod rules;
mod snapshot;
mod transport;

pub use board::{standard_graph, Board, BoardOptions};
pub use constants::*;
pub use error::{GraphError, MorrisError, ProtocolError, Result};
pub use game::{Game, GamePhase, TurnLedger};
pub use graph::{Graph, GraphEntry, VertexId};
pub use hash::{fingerprint, tuple_fingerprint, Crypto, Sha256Crypto, SharedCrypto};
pub use message::{PeerCommand, PeerMessage};
pub use moves::{GameAction, Move, MoveGenerator};
pub use piece::{Cell, CellId, GamePiece, PieceKey, PieceState, Side};
pub use player::{Player, PlayerId};
pub use rules::GameRules;
pub use snapshot::{BoardSnapshot, GameSnapshot, PieceSnapshot, PlayerSnapshot};
pub use transport::{
    encode_frame, ChannelConnection, Connection, Connector, Listener, NetworkConfig, PeerFrame,
    StreamConnection, TcpConnection, TcpConnector, TcpListener, TransportType,
};
