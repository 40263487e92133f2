//! Builder 模式实现
//!
//! 提供链式构造 `Robot` 实例的便捷方式。

use std::time::Duration;

use armlink_driver::{RealtimeConfig, RobotImpl, SessionConfig};
use armlink_net::NetTransport;
use tracing::info;

use crate::{Robot, RobotError};

/// Robot Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use armlink_client::RobotBuilder;
///
/// let robot = RobotBuilder::new("172.16.0.2")
///     .receive_timeout(Duration::from_millis(100))
///     .connect()
///     .unwrap();
/// println!("server version {}", robot.server_version());
/// ```
#[derive(Debug, Clone)]
pub struct RobotBuilder {
    address: String,
    config: SessionConfig,
}

impl RobotBuilder {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            config: SessionConfig::default(),
        }
    }

    /// 控制器 TCP 端口（默认 1337）
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// 连接与握手超时（默认 5s）
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = duration_ms(timeout);
        self
    }

    /// 等待状态报文的超时（默认 1s）
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.config.receive_timeout_ms = duration_ms(timeout);
        self
    }

    /// 等待请求应答的超时（默认 5s）
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.config.realtime = realtime;
        self
    }

    /// 整体替换会话配置（例如从配置文件加载的）
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.config
    }

    /// 建立连接并完成握手
    ///
    /// # Errors
    /// - `RobotError::Network`: 连接失败或握手超时
    /// - `RobotError::IncompatibleVersion`: 控制器拒绝本库版本
    pub fn connect(self) -> Result<Robot<NetTransport>, RobotError> {
        let engine = RobotImpl::connect(&self.address, self.config)?;
        info!(
            "Robot at {} ready (server version {})",
            self.address,
            engine.server_version()
        );
        Ok(Robot::from_engine(engine))
    }
}

/// 不足 1ms 的超时向上取整，避免变成 0
fn duration_ms(duration: Duration) -> u64 {
    let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 && !duration.is_zero() { 1 } else { ms }
}
