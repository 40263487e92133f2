//! 模式枚举与指令状态码
//!
//! 所有枚举在线路上均编码为 1 字节（`#[repr(u8)]`），
//! 通过 `num_enum` 完成 u8 与枚举之间的转换。

use num_enum::{IntoPrimitive, TryFromPrimitive};

// ============================================================================
// 模式
// ============================================================================

/// 控制器当前激活的运动发生器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MotionGeneratorMode {
    /// 无运动发生器（纯力矩控制或空闲）
    #[default]
    Idle = 0,
    JointPosition = 1,
    JointVelocity = 2,
    CartesianPosition = 3,
    CartesianVelocity = 4,
}

impl MotionGeneratorMode {
    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }
}

/// 可启动的运动发生器类型（不含 Idle）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MotionGeneratorType {
    JointPosition = 1,
    JointVelocity = 2,
    CartesianPosition = 3,
    CartesianVelocity = 4,
}

impl From<MotionGeneratorType> for MotionGeneratorMode {
    fn from(value: MotionGeneratorType) -> Self {
        match value {
            MotionGeneratorType::JointPosition => Self::JointPosition,
            MotionGeneratorType::JointVelocity => Self::JointVelocity,
            MotionGeneratorType::CartesianPosition => Self::CartesianPosition,
            MotionGeneratorType::CartesianVelocity => Self::CartesianVelocity,
        }
    }
}

/// 控制器模式（关节阻抗、笛卡尔阻抗、外部力矩控制）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ControllerMode {
    #[default]
    JointImpedance = 0,
    CartesianImpedance = 1,
    /// 外部控制器：由客户端发送关节力矩
    ExternalController = 2,
    Other = 3,
}

/// 机械臂整体运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RobotMode {
    #[default]
    Other = 0,
    Idle = 1,
    Move = 2,
    Guiding = 3,
    Reflex = 4,
    UserStopped = 5,
    AutomaticErrorRecovery = 6,
}

// ============================================================================
// 指令状态码
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ConnectStatus {
    Success = 0,
    IncompatibleLibraryVersion = 1,
    Rejected = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum StartMotionGeneratorStatus {
    Success = 0,
    Rejected = 1,
    Aborted = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum StopMotionGeneratorStatus {
    Success = 0,
    Rejected = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SetControllerModeStatus {
    Success = 0,
    Rejected = 1,
}

/// Move 指令的状态码
///
/// 一次 Move 会收到两条应答：先是 `MotionStarted`，
/// 运动结束时再收到 `Success` 或某个失败状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MoveStatus {
    Success = 0,
    MotionStarted = 1,
    Preempted = 2,
    CommandNotPossibleRejected = 3,
    StartAtSingularPoseRejected = 4,
    InvalidArgumentRejected = 5,
    ReflexAborted = 6,
    EmergencyAborted = 7,
    InputErrorAborted = 8,
    Aborted = 9,
}

impl MoveStatus {
    /// 是否为最终失败状态
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::Success | Self::MotionStarted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum StopMoveStatus {
    Success = 0,
    CommandNotPossibleRejected = 1,
    EmergencyAborted = 2,
    ReflexAborted = 3,
    Aborted = 4,
}

/// 运动允许的最大偏差（平移 m，旋转 rad，肘部 rad）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Deviation {
    pub translation: f64,
    pub rotation: f64,
    pub elbow: f64,
}

impl Deviation {
    pub const fn new(translation: f64, rotation: f64, elbow: f64) -> Self {
        Self {
            translation,
            rotation,
            elbow,
        }
    }
}

impl Default for Deviation {
    fn default() -> Self {
        Self::new(10.0, 3.12, 2.0 * std::f64::consts::PI)
    }
}
