//! 控制回调的目标值类型
//!
//! 每个运动目标类型对应一种运动发生器模式，并知道如何写入指令报文。

use armlink_protocol::{
    JOINT_COUNT, MotionGeneratorCommand, MotionGeneratorMode, POSE_ELEMENTS, RobotState,
    TWIST_ELEMENTS,
};

/// 运动发生器目标值
pub trait MotionTarget {
    /// 对应的运动发生器模式
    const MODE: MotionGeneratorMode;

    /// 把目标值写入指令（其余字段保持不变）
    fn write_to(&self, command: &mut MotionGeneratorCommand);
}

/// 关节位置目标（rad）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointPositions(pub [f64; JOINT_COUNT]);

/// 关节速度目标（rad/s）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointVelocities(pub [f64; JOINT_COUNT]);

/// 末端位姿目标（4x4 齐次变换，列主序）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartesianPose(pub [f64; POSE_ELEMENTS]);

/// 末端速度目标（线速度 m/s + 角速度 rad/s）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartesianVelocities(pub [f64; TWIST_ELEMENTS]);

/// 关节力矩指令（Nm）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Torques(pub [f64; JOINT_COUNT]);

impl MotionTarget for JointPositions {
    const MODE: MotionGeneratorMode = MotionGeneratorMode::JointPosition;

    fn write_to(&self, command: &mut MotionGeneratorCommand) {
        command.joint_positions = self.0;
    }
}

impl MotionTarget for JointVelocities {
    const MODE: MotionGeneratorMode = MotionGeneratorMode::JointVelocity;

    fn write_to(&self, command: &mut MotionGeneratorCommand) {
        command.joint_velocities = self.0;
    }
}

impl MotionTarget for CartesianPose {
    const MODE: MotionGeneratorMode = MotionGeneratorMode::CartesianPosition;

    fn write_to(&self, command: &mut MotionGeneratorCommand) {
        command.cartesian_pose = self.0;
    }
}

impl MotionTarget for CartesianVelocities {
    const MODE: MotionGeneratorMode = MotionGeneratorMode::CartesianVelocity;

    fn write_to(&self, command: &mut MotionGeneratorCommand) {
        command.cartesian_velocities = self.0;
    }
}

impl From<&RobotState> for JointPositions {
    fn from(state: &RobotState) -> Self {
        Self(state.joint_positions)
    }
}

impl From<&RobotState> for CartesianPose {
    fn from(state: &RobotState) -> Self {
        Self(state.cartesian_pose)
    }
}

impl JointVelocities {
    pub const ZERO: Self = Self([0.0; JOINT_COUNT]);
}

impl CartesianVelocities {
    pub const ZERO: Self = Self([0.0; TWIST_ELEMENTS]);
}

impl Torques {
    pub const ZERO: Self = Self([0.0; JOINT_COUNT]);
}
