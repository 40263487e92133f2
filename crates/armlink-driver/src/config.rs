//! 会话配置

use std::time::Duration;

use armlink_protocol::{COMMAND_PORT, Deviation};

/// 实时调度策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RealtimeConfig {
    /// 控制循环开始前必须成功提升线程优先级，否则报错
    Enforce,
    /// 不调整线程优先级
    #[default]
    Ignore,
}

/// 会话配置
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// 控制器 TCP 端口
    pub port: u16,
    /// TCP 连接与握手超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 控制循环中等待下一条状态报文的超时（毫秒）
    pub receive_timeout_ms: u64,
    /// 等待请求应答及模式确认的超时（毫秒）
    pub command_timeout_ms: u64,
    pub realtime: RealtimeConfig,
    pub maximum_path_deviation: Deviation,
    pub maximum_goal_deviation: Deviation,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: COMMAND_PORT,
            connect_timeout_ms: 5_000,
            receive_timeout_ms: 1_000,
            command_timeout_ms: 5_000,
            realtime: RealtimeConfig::default(),
            maximum_path_deviation: Deviation::default(),
            maximum_goal_deviation: Deviation::default(),
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
