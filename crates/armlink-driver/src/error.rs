//! Driver 模块错误类型定义

use armlink_net::NetError;
use armlink_protocol::ProtocolError;
use thiserror::Error;

/// Driver 层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 网络错误（连接失败、接收超时、连接被关闭）
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    /// 收到无法解析的帧或报文，会话不可继续
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 控制器拒绝了本库的协议版本
    #[error(
        "Incompatible library version (server version: {server_version}, library version: {library_version})"
    )]
    IncompatibleVersion {
        server_version: u16,
        library_version: u16,
    },

    /// 运动发生器启动/停止失败，或运行中被控制器终止
    #[error("Motion generator error: {0}")]
    MotionGenerator(String),

    /// 请求被控制器拒绝（握手等非运动类请求）
    #[error("Command rejected: {0}")]
    CommandRejected(String),

    /// 与正在进行的操作冲突
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// 回调给出了非法指令（NaN/Inf）
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// 实时线程优先级设置失败
    #[error("Realtime error: {0}")]
    Realtime(String),
}

impl DriverError {
    /// 连接已不可用（超时、关闭、IO 错误或协议错误）
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Protocol(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(NetError::Timeout))
    }
}
