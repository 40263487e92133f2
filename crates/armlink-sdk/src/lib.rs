//! armlink SDK - 机械臂 1 kHz 实时控制 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 请求/应答帧与状态/指令报文的编解码
//! - **网络层** (`net`): TCP + UDP 传输、关闭句柄、测试用 mock 传输
//! - **驱动层** (`driver`): 握手、控制周期、运动发生器状态机、操作仲裁
//! - **客户端层** (`client`): `Robot` 句柄和回调式控制接口
//!
//! # 快速开始
//!
//! ```no_run
//! use armlink_sdk::prelude::*;
//!
//! armlink_sdk::init_logger();
//! let robot = Robot::connect("172.16.0.2")?;
//! robot.read(|state| {
//!     println!("{:?}", state.joint_positions);
//!     state.message_id < 1000
//! })?;
//! # Ok::<(), RobotError>(())
//! ```

pub mod logging;
pub mod prelude;

pub use armlink_client as client;
pub use armlink_driver as driver;
pub use armlink_net as net;
pub use armlink_protocol as protocol;

// 客户端层（推荐使用）
pub use client::{Robot, RobotBuilder, RobotError, Step};

// 驱动层（高级用户直接驱动控制周期）
pub use driver::{DriverError, RobotImpl, SessionConfig};

pub use logging::{init_logger, try_init_logger};
