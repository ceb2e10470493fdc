//! 自动对弈
//!
//! 轮到本方时随机选一个合法走法，否则等待对方消息，直到对局结束、
//! 达到回合上限或连接关闭。

use anyhow::Result;
use morris_protocol::{Connection, ProtocolError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::broker::PeerBroker;
use crate::peer::PeerState;

/// 自动对弈参数
#[derive(Debug, Clone, Copy)]
pub struct AutoplayOptions {
    /// 回合上限
    pub max_turns: u32,
    /// 随机种子
    pub seed: u64,
}

/// 运行自动对弈，返回结束时的对端状态
pub async fn run_autoplay<C: Connection>(mut broker: PeerBroker<C>, options: AutoplayOptions) -> Result<PeerState> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    broker.open().await?;

    while !broker.peer().is_finished() {
        let next = match broker.peer().game() {
            Some(game) if game.is_my_turn() => {
                if game.turn() >= options.max_turns {
                    info!(turn = game.turn(), "达到回合上限，停止自动对弈");
                    break;
                }
                match game.legal_moves().choose(&mut rng) {
                    Some(mv) => Some(mv.clone()),
                    None => {
                        warn!(turn = game.turn(), "没有可走的合法走法");
                        break;
                    }
                }
            }
            _ => None,
        };

        match next {
            Some(mv) => broker.play(&mv).await?,
            None => match broker.poll().await {
                Ok(_) => {}
                Err(e) if is_connection_closed(&e) => {
                    info!(me = %broker.peer().me(), "对方已断开连接");
                    break;
                }
                Err(e) => return Err(e),
            },
        }
    }

    Ok(broker.into_peer())
}

fn is_connection_closed(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<ProtocolError>(), Some(ProtocolError::ConnectionClosed))
}
