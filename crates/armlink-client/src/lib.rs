//! 客户端接口模块
//!
//! 大多数用户应该使用的入口：
//!
//! - [`Robot`]: 会话句柄，提供读取与各类控制操作
//! - [`RobotBuilder`]: 链式配置并连接
//! - [`types`]: 控制回调的目标值类型
//! - [`config`]: 从 TOML 加载会话配置
//!
//! 需要直接驱动控制周期（`update()`）或运动发生器状态机时，使用 `armlink-driver`。
//!
//! # Example
//!
//! ```no_run
//! use armlink_client::{JointPositions, Robot, Step};
//! use armlink_protocol::ControllerMode;
//!
//! let robot = Robot::connect("172.16.0.2")?;
//! let start = JointPositions::from(&robot.read_once()?);
//! let mut time = 0.0;
//! robot.control_joint_positions(
//!     |_state, elapsed| {
//!         time += elapsed.as_secs_f64();
//!         if time > 5.0 {
//!             return Step::Stop;
//!         }
//!         let mut target = start;
//!         target.0[3] += 0.1 * (1.0 - (std::f64::consts::PI * time / 5.0).cos());
//!         Step::Continue(target)
//!     },
//!     ControllerMode::JointImpedance,
//! )?;
//! # Ok::<(), armlink_client::RobotError>(())
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod robot;
pub mod types;

pub use armlink_driver::{MetricsSnapshot, PendingOperation, RealtimeConfig, SessionConfig, Step};
pub use builder::RobotBuilder;
pub use config::{load_config, parse_config};
pub use error::RobotError;
pub use robot::Robot;
pub use types::*;
