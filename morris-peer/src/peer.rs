//! 对端同步状态
//!
//! 每条消息都携带发送前后的状态指纹，双方各自维护最近一次的指纹，
//! 收到的消息必须接在本地指纹之后，否则判定为不同步并走重同步流程。
//! 主机与客户端共用同一份状态记录，角色差异由行为表决定。

use morris_protocol::{
    tuple_fingerprint, BoardOptions, Game, GameSnapshot, Move, MorrisError, PeerCommand,
    PeerMessage, Player, SharedCrypto, INITIATOR_NAME, RESPONDER_NAME,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::PersistedSession;

/// 对端角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// 主机：发起握手，执先手
    Host,
    /// 客户端：应答握手，执后手
    Client,
}

/// 同步错误
#[derive(Error, Debug)]
pub enum SyncError {
    /// 前序指纹与本地记录不符
    #[error("Desync on {command}: expected prior hash {expected:?}, got {received:?}")]
    Desync {
        command: PeerCommand,
        expected: Option<String>,
        received: Option<String>,
    },

    /// 新状态指纹与本地计算结果不符
    #[error("Fingerprint mismatch on {command}: claimed {claimed}, computed {computed}")]
    HashMismatch {
        command: PeerCommand,
        claimed: String,
        computed: String,
    },

    /// 对端走法不合法
    #[error("Illegal move: {0}")]
    IllegalMove(String),

    /// 尚未开始对局
    #[error("No game in progress")]
    NoGame,

    /// 载荷无法解析
    #[error("Malformed {command} payload: {reason}")]
    MalformedPayload { command: PeerCommand, reason: String },

    /// 结束通知中的胜者与本地不符
    #[error("Game over notice names {claimed}, local winner is {local:?}")]
    WinnerMismatch { claimed: String, local: Option<String> },

    /// JSON 序列化错误
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// 规则或状态机错误
    #[error("Morris error: {0}")]
    Morris(#[from] MorrisError),
}

impl SyncError {
    /// 是否应通过重同步恢复
    pub fn needs_resync(&self) -> bool {
        !matches!(self, SyncError::Json(_) | SyncError::Morris(_))
    }
}

type Reply = Result<Option<PeerMessage>, SyncError>;

/// 角色行为表
struct RoleBehavior {
    /// 本方是否先手
    initiator: bool,
    /// 连接建立后的第一条消息
    greet: fn(&mut PeerState) -> Reply,
    /// 握手与邀请类命令
    respond: fn(&mut PeerState, &PeerMessage) -> Reply,
    /// 重新连上之后
    reconnect: fn(&mut PeerState) -> Reply,
}

static HOST_BEHAVIOR: RoleBehavior = RoleBehavior {
    initiator: true,
    greet: host_greet,
    respond: host_respond,
    reconnect: host_reconnect,
};

static CLIENT_BEHAVIOR: RoleBehavior = RoleBehavior {
    initiator: false,
    greet: client_greet,
    respond: client_respond,
    reconnect: client_reconnect,
};

impl PeerRole {
    fn behavior(self) -> &'static RoleBehavior {
        match self {
            PeerRole::Host => &HOST_BEHAVIOR,
            PeerRole::Client => &CLIENT_BEHAVIOR,
        }
    }

    /// 本方是否先手
    pub fn is_initiator(self) -> bool {
        self.behavior().initiator
    }
}

fn host_greet(state: &mut PeerState) -> Reply {
    let me = state.me.clone();
    state.prepare_message(PeerCommand::Helo, me).map(Some)
}

fn host_respond(state: &mut PeerState, msg: &PeerMessage) -> Reply {
    match msg.command {
        PeerCommand::Ehlo => {
            let options = serde_json::to_string(&state.options)?;
            state.prepare_message(PeerCommand::PlayWithMe, options).map(Some)
        }
        PeerCommand::IWillPlayWithYou => {
            state.start_game()?;
            Ok(None)
        }
        PeerCommand::IWontPlayWithYou => {
            info!(peer = %state.them, reason = %msg.payload, "对方拒绝对局邀请");
            Ok(None)
        }
        other => {
            debug!(command = %other, "主机忽略该命令");
            Ok(None)
        }
    }
}

fn host_reconnect(_state: &mut PeerState) -> Reply {
    // 等待客户端请求重同步
    Ok(None)
}

fn client_greet(_state: &mut PeerState) -> Reply {
    Ok(None)
}

fn client_respond(state: &mut PeerState, msg: &PeerMessage) -> Reply {
    match msg.command {
        PeerCommand::Helo => {
            let me = state.me.clone();
            state.prepare_message(PeerCommand::Ehlo, me).map(Some)
        }
        PeerCommand::PlayWithMe => {
            if state.game.as_ref().is_some_and(|game| !game.is_over()) {
                return state.prepare_message(PeerCommand::IWontPlayWithYou, "busy").map(Some);
            }
            let options: BoardOptions =
                serde_json::from_str(&msg.payload).map_err(|e| SyncError::MalformedPayload {
                    command: msg.command,
                    reason: e.to_string(),
                })?;
            // 先用临时对局校验配置，失败时保留原配置并拒绝邀请
            let game = match state.new_game(options) {
                Ok(game) => game,
                Err(e) => {
                    warn!(peer = %state.them, error = %e, "对方的棋盘配置无效，拒绝邀请");
                    return state.prepare_message(PeerCommand::IWontPlayWithYou, e.to_string()).map(Some);
                }
            };
            state.options = options;
            state.install_game(game);
            let me = state.me.clone();
            state.prepare_message(PeerCommand::IWillPlayWithYou, me).map(Some)
        }
        other => {
            debug!(command = %other, "客户端忽略该命令");
            Ok(None)
        }
    }
}

fn client_reconnect(state: &mut PeerState) -> Reply {
    state.request_resync().map(Some)
}

/// 对端同步状态
#[derive(Debug, Clone)]
pub struct PeerState {
    role: PeerRole,
    me: String,
    them: String,
    options: BoardOptions,
    game: Option<Game>,
    last_state_hash: Option<String>,
    is_connected: bool,
    finished: bool,
    last_rejection: Option<String>,
    crypto: SharedCrypto,
}

impl PeerState {
    pub fn new(role: PeerRole, me: impl Into<String>, them: impl Into<String>, crypto: SharedCrypto) -> Self {
        Self {
            role,
            me: me.into(),
            them: them.into(),
            options: BoardOptions::default(),
            game: None,
            last_state_hash: None,
            is_connected: true,
            finished: false,
            last_rejection: None,
            crypto,
        }
    }

    /// 指定棋盘配置（主机在邀请中发送给对方）
    pub fn with_options(mut self, options: BoardOptions) -> Self {
        self.options = options;
        self
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    pub fn them(&self) -> &str {
        &self.them
    }

    pub fn options(&self) -> &BoardOptions {
        &self.options
    }

    pub fn game(&self) -> Option<&Game> {
        self.game.as_ref()
    }

    pub fn crypto(&self) -> &SharedCrypto {
        &self.crypto
    }

    pub fn last_state_hash(&self) -> Option<&str> {
        self.last_state_hash.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// 已发送或收到结束通知
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 对方最近一次拒绝本方消息的原因
    pub fn last_rejection(&self) -> Option<&str> {
        self.last_rejection.as_deref()
    }

    fn start_game(&mut self) -> Result<(), SyncError> {
        let game = self.new_game(self.options)?;
        self.install_game(game);
        Ok(())
    }

    fn new_game(&self, options: BoardOptions) -> Result<Game, MorrisError> {
        let initiator = self.role.is_initiator();
        let (my_name, their_name) = if initiator {
            (INITIATOR_NAME, RESPONDER_NAME)
        } else {
            (RESPONDER_NAME, INITIATOR_NAME)
        };
        let players = [
            Player::new(self.me.clone(), my_name, initiator),
            Player::new(self.them.clone(), their_name, !initiator),
        ];

        Game::with_options(players, &self.me, options, self.crypto.clone())
    }

    fn install_game(&mut self, game: Game) {
        info!(role = ?self.role, me = %self.me, them = %self.them, "对局开始");
        self.game = Some(game);
        self.finished = false;
    }

    /// 连接建立后按角色发出第一条消息
    pub fn open(&mut self) -> Reply {
        (self.role.behavior().greet)(self)
    }

    /// 构造发往对方的消息，并把本地指纹推进到新值
    pub fn prepare_message(&mut self, command: PeerCommand, payload: impl Into<String>) -> Result<PeerMessage, SyncError> {
        let payload = payload.into();
        let new_hash = match command {
            PeerCommand::Move => self.game.as_ref().ok_or(SyncError::NoGame)?.state_hash()?,
            _ => tuple_fingerprint(self.crypto.as_ref(), &self.me, &self.them, &payload),
        };

        let prior = self.last_state_hash.replace(new_hash.clone());
        debug!(command = %command, prior = ?prior, new = %new_hash, "准备消息");
        Ok(PeerMessage::new(command, prior, new_hash, payload))
    }

    /// 处理对方消息，必要时返回应答
    pub fn handle_message(&mut self, msg: &PeerMessage) -> Reply {
        if msg.command.is_notice() {
            self.handle_notice(msg);
            return Ok(None);
        }
        self.check_prior_hash(msg)?;

        if msg.command == PeerCommand::Move {
            self.handle_move(msg)?;
            return Ok(None);
        }

        let computed = tuple_fingerprint(self.crypto.as_ref(), &self.them, &self.me, &msg.payload);
        if computed != msg.new_state_hash {
            return Err(SyncError::HashMismatch {
                command: msg.command,
                claimed: msg.new_state_hash.clone(),
                computed,
            });
        }
        self.last_state_hash = Some(computed);

        match msg.command {
            PeerCommand::ResyncRequest => self.respond_resync().map(Some),
            PeerCommand::ResyncResponse => {
                self.load_resync(&msg.payload)?;
                Ok(None)
            }
            PeerCommand::GameOver => {
                self.confirm_game_over(&msg.payload)?;
                Ok(None)
            }
            _ => (self.role.behavior().respond)(self, msg),
        }
    }

    /// 本地账本为空（尚无对局或尚未完成任何回合）
    fn ledger_is_empty(&self) -> bool {
        self.game.as_ref().map_or(true, |game| game.ledger().is_empty())
    }

    fn check_prior_hash(&self, msg: &PeerMessage) -> Result<(), SyncError> {
        // 断链后只有重同步请求能接上，快照应答必须接在请求之后
        if msg.command == PeerCommand::ResyncRequest || msg.prior_state_hash == self.last_state_hash {
            return Ok(());
        }
        if msg.command.is_handshake() && msg.prior_state_hash.is_none() && self.ledger_is_empty() {
            return Ok(());
        }

        warn!(
            command = %msg.command,
            expected = ?self.last_state_hash,
            received = ?msg.prior_state_hash,
            "前序指纹不符"
        );
        Err(SyncError::Desync {
            command: msg.command,
            expected: self.last_state_hash.clone(),
            received: msg.prior_state_hash.clone(),
        })
    }

    fn handle_notice(&mut self, msg: &PeerMessage) {
        let computed = tuple_fingerprint(self.crypto.as_ref(), &self.them, &self.me, &msg.payload);
        if computed != msg.new_state_hash {
            debug!(command = %msg.command, "丢弃指纹不符的拒绝通知");
            return;
        }
        warn!(command = %msg.command, peer = %self.them, reason = %msg.payload, "对方拒绝了本方消息");
        self.last_rejection = Some(msg.payload.clone());
    }

    /// 构造拒绝通知，不推进本地指纹
    pub fn rejection_notice(&self, err: &SyncError) -> PeerMessage {
        let command = match err {
            SyncError::Desync { .. } | SyncError::HashMismatch { .. } => PeerCommand::HashMismatch,
            _ => PeerCommand::Error,
        };
        let payload = err.to_string();
        let new_hash = tuple_fingerprint(self.crypto.as_ref(), &self.me, &self.them, &payload);
        PeerMessage::new(command, self.last_state_hash.clone(), new_hash, payload)
    }

    fn handle_move(&mut self, msg: &PeerMessage) -> Result<(), SyncError> {
        let mv = Move::from_json(&msg.payload).map_err(|e| SyncError::MalformedPayload {
            command: msg.command,
            reason: e.to_string(),
        })?;
        if mv.player_id != self.them {
            return Err(SyncError::IllegalMove(format!("{} claims to act for {}", self.them, mv.player_id)));
        }

        let game = self.game.as_mut().ok_or(SyncError::NoGame)?;
        if !game.apply_move(&mv) {
            return Err(SyncError::IllegalMove(mv.to_string()));
        }

        let computed = game.state_hash()?;
        self.last_state_hash = Some(computed.clone());
        if computed != msg.new_state_hash {
            warn!(claimed = %msg.new_state_hash, computed = %computed, "走法后的状态指纹不符");
            return Err(SyncError::HashMismatch {
                command: msg.command,
                claimed: msg.new_state_hash.clone(),
                computed,
            });
        }

        debug!(mv = %mv, turn = game.turn(), "已应用对方走法");
        Ok(())
    }

    /// 本地点击格点，产生需要发送的消息
    pub fn click_cell(&mut self, cell: usize) -> Result<Vec<PeerMessage>, SyncError> {
        let game = self.game.as_mut().ok_or(SyncError::NoGame)?;
        match game.handle_cell_click(cell)? {
            Some(mv) => self.announce_move(&mv),
            None => Ok(Vec::new()),
        }
    }

    /// 提交本地走法，产生需要发送的消息
    pub fn submit_move(&mut self, mv: &Move) -> Result<Vec<PeerMessage>, SyncError> {
        if mv.player_id != self.me {
            return Err(SyncError::IllegalMove(format!("{} is not the local player", mv.player_id)));
        }
        let game = self.game.as_mut().ok_or(SyncError::NoGame)?;
        if !game.is_my_turn() || !game.apply_move(mv) {
            return Err(SyncError::IllegalMove(mv.to_string()));
        }
        self.announce_move(mv)
    }

    fn announce_move(&mut self, mv: &Move) -> Result<Vec<PeerMessage>, SyncError> {
        let mut messages = vec![self.prepare_message(PeerCommand::Move, mv.to_json()?)?];

        let winner = self
            .game
            .as_ref()
            .and_then(|game| game.winner())
            .map(|p| p.id().to_string());
        if let Some(winner) = winner {
            info!(winner = %winner, "本方走法结束了对局");
            messages.push(self.prepare_message(PeerCommand::GameOver, winner)?);
            self.finished = true;
        }

        Ok(messages)
    }

    fn confirm_game_over(&mut self, winner: &str) -> Result<(), SyncError> {
        let local = self
            .game
            .as_ref()
            .and_then(|game| game.winner())
            .map(|p| p.id().to_string());
        if local.as_deref() != Some(winner) {
            return Err(SyncError::WinnerMismatch {
                claimed: winner.to_string(),
                local,
            });
        }
        info!(winner = %winner, "收到对局结束通知");
        self.finished = true;
        Ok(())
    }

    /// 请求对方发送完整快照
    pub fn request_resync(&mut self) -> Result<PeerMessage, SyncError> {
        info!(peer = %self.them, "请求重同步");
        let me = self.me.clone();
        self.prepare_message(PeerCommand::ResyncRequest, me)
    }

    fn respond_resync(&mut self) -> Result<PeerMessage, SyncError> {
        let snapshot: Option<GameSnapshot> = self.game.as_ref().map(Game::snapshot);
        let payload = serde_json::to_string(&snapshot)?;
        self.prepare_message(PeerCommand::ResyncResponse, payload)
    }

    fn load_resync(&mut self, payload: &str) -> Result<(), SyncError> {
        let snapshot: Option<GameSnapshot> =
            serde_json::from_str(payload).map_err(|e| SyncError::MalformedPayload {
                command: PeerCommand::ResyncResponse,
                reason: e.to_string(),
            })?;
        let Some(snapshot) = snapshot else {
            debug!("对方没有进行中的对局");
            return Ok(());
        };

        let malformed = |e: MorrisError| SyncError::MalformedPayload {
            command: PeerCommand::ResyncResponse,
            reason: e.to_string(),
        };
        match self.game.as_mut() {
            Some(game) => game.load_snapshot(&snapshot).map_err(malformed)?,
            None => {
                let game = Game::from_snapshot(&snapshot, &self.me, self.options, self.crypto.clone()).map_err(malformed)?;
                self.game = Some(game);
            }
        }
        self.finished = self.game.as_ref().is_some_and(Game::is_over);
        info!(turn = snapshot.turn, "已载入重同步快照");
        Ok(())
    }

    /// 传输层报告断线
    pub fn mark_disconnected(&mut self) {
        info!(peer = %self.them, "与对方断开连接");
        self.is_connected = false;
    }

    /// 传输层报告重连，按角色决定是否请求重同步
    pub fn mark_reconnected(&mut self) -> Reply {
        info!(peer = %self.them, "与对方重新连接");
        self.is_connected = true;
        (self.role.behavior().reconnect)(self)
    }

    /// 导出持久化会话
    pub fn to_session(&self, timestamp_millis: i64) -> PersistedSession {
        PersistedSession {
            game_state: self.game.as_ref().map(Game::snapshot),
            opponent_id: self.them.clone(),
            my_peer_id: self.me.clone(),
            role: self.role,
            last_state_hash: self.last_state_hash.clone(),
            timestamp_millis,
            is_connected: self.is_connected,
        }
    }

    /// 从持久化会话恢复（恢复后视为断线，等待重连）
    pub fn from_session(session: &PersistedSession, options: BoardOptions, crypto: SharedCrypto) -> Result<Self, SyncError> {
        let game = session
            .game_state
            .as_ref()
            .map(|snapshot| Game::from_snapshot(snapshot, &session.my_peer_id, options, crypto.clone()))
            .transpose()?;
        let finished = game.as_ref().is_some_and(Game::is_over);

        Ok(Self {
            role: session.role,
            me: session.my_peer_id.clone(),
            them: session.opponent_id.clone(),
            options,
            game,
            last_state_hash: session.last_state_hash.clone(),
            is_connected: false,
            finished,
            last_rejection: None,
            crypto,
        })
    }
}
