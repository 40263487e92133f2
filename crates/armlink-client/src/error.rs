//! 客户端错误类型
//!
//! 把 driver 层的错误摊平成用户直接匹配的一组类别。

use armlink_driver::DriverError;
use armlink_net::NetError;
use armlink_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RobotError {
    // ==================== 连接不可用 ====================
    /// 连接失败、等待状态超时、连接关闭或 IO 错误
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    /// 无法解析的报文
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(
        "Incompatible library version (server version: {server_version}, library version: {library_version})"
    )]
    IncompatibleVersion {
        server_version: u16,
        library_version: u16,
    },

    // ==================== 操作失败 ====================
    /// 运动发生器被拒绝、被终止或与控制器报告的模式不一致
    #[error("Motion generator error: {0}")]
    MotionGenerator(String),

    #[error("Command rejected: {0}")]
    CommandRejected(String),

    /// 与正在进行的读取/控制操作冲突
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// 回调给出的指令含 NaN 或无穷大
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Realtime error: {0}")]
    Realtime(String),

    /// 配置文件读取或解析失败
    #[error("Config error: {0}")]
    Config(String),
}

impl RobotError {
    /// 连接已不可用，需要重新连接
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Protocol(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(NetError::Timeout))
    }
}

impl From<DriverError> for RobotError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Network(e) => Self::Network(e),
            DriverError::Protocol(e) => Self::Protocol(e),
            DriverError::IncompatibleVersion {
                server_version,
                library_version,
            } => Self::IncompatibleVersion {
                server_version,
                library_version,
            },
            DriverError::MotionGenerator(msg) => Self::MotionGenerator(msg),
            DriverError::CommandRejected(msg) => Self::CommandRejected(msg),
            DriverError::InvalidOperation(msg) => Self::InvalidOperation(msg),
            DriverError::InvalidCommand(msg) => Self::InvalidCommand(msg),
            DriverError::Realtime(msg) => Self::Realtime(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_mapping() {
        let err = RobotError::from(DriverError::Network(NetError::Timeout));
        assert!(err.is_timeout());
        assert!(err.is_fatal());

        let err = RobotError::from(DriverError::InvalidOperation("busy".to_string()));
        assert!(matches!(err, RobotError::InvalidOperation(ref msg) if msg == "busy"));
        assert!(!err.is_fatal());

        let err = RobotError::from(DriverError::IncompatibleVersion {
            server_version: 3,
            library_version: 1,
        });
        assert!(matches!(
            err,
            RobotError::IncompatibleVersion {
                server_version: 3,
                library_version: 1
            }
        ));
    }

    #[test]
    fn test_robot_error_display() {
        assert_eq!(
            format!("{}", RobotError::Config("missing file".to_string())),
            "Config error: missing file"
        );
        assert_eq!(
            format!("{}", RobotError::MotionGenerator("rejected".to_string())),
            "Motion generator error: rejected"
        );
    }
}
