//! # Armlink Driver
//!
//! 会话管理、实时控制循环与操作仲裁。
//!
//! ## 模块
//!
//! - `session`: TCP 连接与版本握手
//! - `robot_impl`: 控制周期 `update()` 与运动发生器状态机
//! - `control_loop`: 回调驱动的控制循环（`Operation` / `Step`）
//! - `operation`: 读取/控制操作的互斥仲裁
//! - `status`: 运动发生器生命周期状态
//! - `config`: 会话配置
//! - `metrics`: 原子计数器
//!
//! ## 线程模型
//!
//! 所有 IO 都在调用线程上同步完成，等待状态报文是唯一的挂起点。
//! 其他线程只能通过原子量和 `ArcSwap` 无锁读取状态，或通过 `ShutdownHandle` 取消等待。

pub mod config;
pub mod control_loop;
pub mod error;
pub mod metrics;
pub mod operation;
pub mod robot_impl;
pub mod session;
pub mod status;

pub use config::{RealtimeConfig, SessionConfig};
pub use control_loop::{ControlLoop, LoopCommand, Operation, Step, apply_realtime};
pub use error::DriverError;
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use operation::{OperationGuard, OperationSlot, PendingOperation};
pub use robot_impl::RobotImpl;
pub use session::Session;
pub use status::{AtomicMotionGeneratorStatus, MotionGeneratorStatus};
