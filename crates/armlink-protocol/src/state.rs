//! UDP 报文：机械臂状态（控制器 → 客户端）与控制指令（客户端 → 控制器）
//!
//! 每个控制周期控制器发送一条 `RobotState`，客户端以一条 `RobotCommand` 作答，
//! 指令中的 `message_id` 等于它所响应的那条状态的 `message_id`。

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{IDENTITY_POSE, JOINT_COUNT, POSE_ELEMENTS, TWIST_ELEMENTS};
use crate::types::{ControllerMode, MotionGeneratorMode, RobotMode};
use crate::{ProtocolError, decode_enum, ensure_len};

/// 定长 UDP 报文的编解码
pub trait Datagram: Sized {
    /// 编码后的字节数
    const SIZE: usize;

    fn encode_into<B: BufMut>(&self, buf: &mut B);

    fn decode(data: &[u8]) -> Result<Self, ProtocolError>;

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

fn put_f64s<B: BufMut>(buf: &mut B, values: &[f64]) {
    for value in values {
        buf.put_f64_le(*value);
    }
}

fn get_f64s<const N: usize>(buf: &mut &[u8]) -> [f64; N] {
    let mut out = [0.0; N];
    for value in out.iter_mut() {
        *value = buf.get_f64_le();
    }
    out
}

fn get_bool(buf: &mut &[u8], field: &'static str) -> Result<bool, ProtocolError> {
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(ProtocolError::InvalidValue { field, value }),
    }
}

// ============================================================================
// RobotState
// ============================================================================

/// 单个控制周期的机械臂状态快照
///
/// `message_id` 严格递增，相邻两条状态的差值即经过的控制周期数（1 周期 = 1ms）。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RobotState {
    pub message_id: u64,
    /// 关节位置 (rad)
    pub joint_positions: [f64; JOINT_COUNT],
    /// 关节速度 (rad/s)
    pub joint_velocities: [f64; JOINT_COUNT],
    /// 关节力矩 (Nm)
    pub joint_torques: [f64; JOINT_COUNT],
    /// 末端位姿，4x4 齐次矩阵，列主序
    pub cartesian_pose: [f64; POSE_ELEMENTS],
    pub motion_generator_mode: MotionGeneratorMode,
    pub controller_mode: ControllerMode,
    pub robot_mode: RobotMode,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            message_id: 0,
            joint_positions: [0.0; JOINT_COUNT],
            joint_velocities: [0.0; JOINT_COUNT],
            joint_torques: [0.0; JOINT_COUNT],
            cartesian_pose: IDENTITY_POSE,
            motion_generator_mode: MotionGeneratorMode::Idle,
            controller_mode: ControllerMode::default(),
            robot_mode: RobotMode::default(),
        }
    }
}

impl Datagram for RobotState {
    const SIZE: usize = 8 + (3 * JOINT_COUNT + POSE_ELEMENTS) * 8 + 3;

    fn encode_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64_le(self.message_id);
        put_f64s(buf, &self.joint_positions);
        put_f64s(buf, &self.joint_velocities);
        put_f64s(buf, &self.joint_torques);
        put_f64s(buf, &self.cartesian_pose);
        buf.put_u8(self.motion_generator_mode.into());
        buf.put_u8(self.controller_mode.into());
        buf.put_u8(self.robot_mode.into());
    }

    fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(data, Self::SIZE)?;
        let mut buf = data;
        Ok(Self {
            message_id: buf.get_u64_le(),
            joint_positions: get_f64s(&mut buf),
            joint_velocities: get_f64s(&mut buf),
            joint_torques: get_f64s(&mut buf),
            cartesian_pose: get_f64s(&mut buf),
            motion_generator_mode: decode_enum("motion_generator_mode", buf.get_u8())?,
            controller_mode: decode_enum("controller_mode", buf.get_u8())?,
            robot_mode: decode_enum("robot_mode", buf.get_u8())?,
        })
    }
}

// ============================================================================
// RobotCommand
// ============================================================================

/// 运动发生器指令
///
/// 只有与当前运动发生器模式对应的字段会被控制器使用。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionGeneratorCommand {
    pub joint_positions: [f64; JOINT_COUNT],
    pub joint_velocities: [f64; JOINT_COUNT],
    pub cartesian_pose: [f64; POSE_ELEMENTS],
    pub cartesian_velocities: [f64; TWIST_ELEMENTS],
    /// 置位后控制器将运动发生器平滑停止
    pub motion_generation_finished: bool,
}

impl Default for MotionGeneratorCommand {
    fn default() -> Self {
        Self {
            joint_positions: [0.0; JOINT_COUNT],
            joint_velocities: [0.0; JOINT_COUNT],
            cartesian_pose: IDENTITY_POSE,
            cartesian_velocities: [0.0; TWIST_ELEMENTS],
            motion_generation_finished: false,
        }
    }
}

impl MotionGeneratorCommand {
    /// 保持当前位姿的指令（位置取自状态，速度为零）
    pub fn hold(state: &RobotState) -> Self {
        Self {
            joint_positions: state.joint_positions,
            cartesian_pose: state.cartesian_pose,
            ..Self::default()
        }
    }

    /// 所有数值是否有限（无 NaN / Inf）
    pub fn is_finite(&self) -> bool {
        self.joint_positions
            .iter()
            .chain(&self.joint_velocities)
            .chain(&self.cartesian_pose)
            .chain(&self.cartesian_velocities)
            .all(|v| v.is_finite())
    }
}

/// 控制器指令（外部控制器模式下的关节力矩）
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControllerCommand {
    pub joint_torques: [f64; JOINT_COUNT],
}

impl ControllerCommand {
    pub fn is_finite(&self) -> bool {
        self.joint_torques.iter().all(|v| v.is_finite())
    }
}

/// 客户端每个周期发送的指令报文
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RobotCommand {
    /// 所响应的状态报文 ID
    pub message_id: u64,
    pub motion: MotionGeneratorCommand,
    pub control: ControllerCommand,
}

impl Datagram for RobotCommand {
    const SIZE: usize = 8 + (2 * JOINT_COUNT + POSE_ELEMENTS + TWIST_ELEMENTS) * 8 + 1 + JOINT_COUNT * 8;

    fn encode_into<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64_le(self.message_id);
        put_f64s(buf, &self.motion.joint_positions);
        put_f64s(buf, &self.motion.joint_velocities);
        put_f64s(buf, &self.motion.cartesian_pose);
        put_f64s(buf, &self.motion.cartesian_velocities);
        buf.put_u8(self.motion.motion_generation_finished as u8);
        put_f64s(buf, &self.control.joint_torques);
    }

    fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(data, Self::SIZE)?;
        let mut buf = data;
        let message_id = buf.get_u64_le();
        let motion = MotionGeneratorCommand {
            joint_positions: get_f64s(&mut buf),
            joint_velocities: get_f64s(&mut buf),
            cartesian_pose: get_f64s(&mut buf),
            cartesian_velocities: get_f64s(&mut buf),
            motion_generation_finished: get_bool(&mut buf, "motion_generation_finished")?,
        };
        let control = ControllerCommand {
            joint_torques: get_f64s(&mut buf),
        };
        Ok(Self {
            message_id,
            motion,
            control,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_datagram_sizes() {
        assert_eq!(RobotState::SIZE, 307);
        assert_eq!(RobotCommand::SIZE, 353);
        assert_eq!(RobotState::default().encode().len(), RobotState::SIZE);
        assert_eq!(RobotCommand::default().encode().len(), RobotCommand::SIZE);
    }

    #[test]
    fn test_state_layout_little_endian() {
        let state = RobotState {
            message_id: 0x0102,
            robot_mode: RobotMode::Move,
            motion_generator_mode: MotionGeneratorMode::CartesianVelocity,
            ..Default::default()
        };
        let bytes = state.encode();
        assert_eq!(&bytes[..8], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        // 末尾三个字节：运动发生器模式、控制器模式、机械臂模式
        assert_eq!(&bytes[bytes.len() - 3..], &[4, 0, 2]);
    }

    #[test]
    fn test_state_decode_rejects_truncated() {
        let bytes = RobotState::default().encode();
        let err = RobotState::decode(&bytes[..100]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidLength {
                expected: 307,
                actual: 100
            }
        );
    }

    #[test]
    fn test_state_decode_rejects_unknown_mode() {
        let mut bytes = RobotState::default().encode().to_vec();
        let last = bytes.len() - 1;
        bytes[last] = 99;
        assert!(matches!(
            RobotState::decode(&bytes),
            Err(ProtocolError::InvalidValue {
                field: "robot_mode",
                value: 99
            })
        ));
    }

    #[test]
    fn test_command_finished_flag_offset() {
        let mut command = RobotCommand::default();
        command.motion.motion_generation_finished = true;
        let bytes = command.encode();
        let flag_offset = 8 + (2 * JOINT_COUNT + POSE_ELEMENTS + TWIST_ELEMENTS) * 8;
        assert_eq!(bytes[flag_offset], 1);

        let mut raw = bytes.to_vec();
        raw[flag_offset] = 7;
        assert!(RobotCommand::decode(&raw).is_err());
    }

    #[test]
    fn test_hold_command_copies_positions() {
        let state = RobotState {
            joint_positions: [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7],
            joint_velocities: [1.0; JOINT_COUNT],
            ..Default::default()
        };
        let hold = MotionGeneratorCommand::hold(&state);
        assert_eq!(hold.joint_positions, state.joint_positions);
        assert_eq!(hold.joint_velocities, [0.0; JOINT_COUNT]);
        assert!(!hold.motion_generation_finished);
    }

    #[test]
    fn test_is_finite() {
        let mut motion = MotionGeneratorCommand::default();
        assert!(motion.is_finite());
        motion.cartesian_velocities[3] = f64::NAN;
        assert!(!motion.is_finite());

        let control = ControllerCommand {
            joint_torques: [0.0, 0.0, f64::INFINITY, 0.0, 0.0, 0.0, 0.0],
        };
        assert!(!control.is_finite());
    }

    fn arb_joints() -> impl Strategy<Value = [f64; JOINT_COUNT]> {
        prop::array::uniform7(-10.0f64..10.0)
    }

    proptest! {
        #[test]
        fn prop_state_codec_preserves_fields(
            message_id in any::<u64>(),
            q in arb_joints(),
            dq in arb_joints(),
            tau in arb_joints(),
            mode in 0u8..=4,
        ) {
            let state = RobotState {
                message_id,
                joint_positions: q,
                joint_velocities: dq,
                joint_torques: tau,
                motion_generator_mode: MotionGeneratorMode::try_from(mode).unwrap(),
                ..Default::default()
            };
            let decoded = RobotState::decode(&state.encode()).unwrap();
            prop_assert_eq!(decoded, state);
        }
    }
}
