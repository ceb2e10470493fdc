//! 状态指纹
//!
//! 摘要与随机 ID 通过 `Crypto` 能力接口注入，核心逻辑不依赖具体实现。

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// 密码学能力接口
pub trait Crypto: Send + Sync + fmt::Debug {
    /// 计算摘要
    fn digest(&self, data: &[u8]) -> Vec<u8>;

    /// 生成随机 ID
    fn random_id(&self) -> String;
}

/// 共享的能力实例
pub type SharedCrypto = Arc<dyn Crypto>;

/// SHA-256 + UUIDv4 实现
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Crypto;

impl Sha256Crypto {
    /// 创建共享实例
    pub fn shared() -> SharedCrypto {
        Arc::new(Self)
    }
}

impl Crypto for Sha256Crypto {
    fn digest(&self, data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    fn random_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// 计算字符串的指纹（小写十六进制）
pub fn fingerprint(crypto: &dyn Crypto, data: &str) -> String {
    hex::encode(crypto.digest(data.as_bytes()))
}

/// 握手类消息的指纹：绑定发送方、接收方与载荷
pub fn tuple_fingerprint(crypto: &dyn Crypto, sender: &str, recipient: &str, payload: &str) -> String {
    fingerprint(crypto, &format!("{}:{}:{}", sender, recipient, payload))
}
