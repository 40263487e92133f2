//! # Armlink Protocol
//!
//! 机械臂控制协议定义（无网络依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量（端口、版本、关节数）
//! - `types`: 模式枚举与各指令的状态码
//! - `state`: UDP 状态报文 / 指令报文
//! - `message`: TCP 请求/应答帧（头部 + 负载）
//!
//! ## 字节序
//!
//! 所有字段均为小端字节序（little-endian），浮点数为 IEEE-754 f64，
//! 枚举和布尔值各占 1 字节。

pub mod constants;
pub mod message;
pub mod state;
pub mod types;

pub use constants::*;
pub use message::*;
pub use state::*;
pub use types::*;

use thiserror::Error;

/// 协议解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Frame size mismatch: header declares {declared} bytes, frame has {actual}")]
    SizeMismatch { declared: usize, actual: usize },

    #[error("Unknown command: {0}")]
    UnknownCommand(u32),

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: u8 },
}

/// 按字段名把 u8 解码为 `num_enum` 枚举
pub(crate) fn decode_enum<E>(field: &'static str, value: u8) -> Result<E, ProtocolError>
where
    E: TryFrom<u8>,
{
    E::try_from(value).map_err(|_| ProtocolError::InvalidValue { field, value })
}

/// 检查剩余字节数是否足够
pub(crate) fn ensure_len(buf: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if buf.len() != expected {
        return Err(ProtocolError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}
