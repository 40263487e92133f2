//! 协议常量定义

use std::time::Duration;

/// 控制器监听的 TCP 端口（默认值，可在连接配置中覆盖）
pub const COMMAND_PORT: u16 = 1337;

/// 本库实现的协议版本，握手时发送给控制器
pub const PROTOCOL_VERSION: u16 = 1;

/// 关节数量
pub const JOINT_COUNT: usize = 7;

/// 笛卡尔位姿（4x4 齐次变换矩阵，列主序）元素个数
pub const POSE_ELEMENTS: usize = 16;

/// 笛卡尔速度（vx, vy, vz, ωx, ωy, ωz）元素个数
pub const TWIST_ELEMENTS: usize = 6;

/// 控制周期：状态报文的 `message_id` 每个周期递增 1
pub const CONTROL_PERIOD: Duration = Duration::from_millis(1);

/// 单位位姿（列主序）
pub const IDENTITY_POSE: [f64; POSE_ELEMENTS] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];
