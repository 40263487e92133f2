//! TCP 请求/应答帧
//!
//! 帧格式：
//!
//! ```text
//! +-------------+----------------+-------------+-----------------+
//! | command u32 | command_id u32 | size u32    | payload         |
//! +-------------+----------------+-------------+-----------------+
//!   size = 12 + payload 长度，全部小端
//! ```
//!
//! 应答与请求通过 `(command, command_id)` 关联。

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::types::*;
use crate::{ProtocolError, decode_enum, ensure_len};

/// 请求/应答类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum Command {
    Connect = 0,
    StartMotionGenerator = 1,
    StopMotionGenerator = 2,
    SetControllerMode = 3,
    Move = 4,
    StopMove = 5,
}

/// 帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub command: Command,
    pub command_id: u32,
    /// 整帧长度（含帧头）
    pub size: u32,
}

impl CommandHeader {
    pub const SIZE: usize = 12;

    pub fn new(command: Command, command_id: u32, payload_len: usize) -> Self {
        Self {
            command,
            command_id,
            size: (Self::SIZE + payload_len) as u32,
        }
    }

    /// 从字节流开头读取帧长度，不足一个帧头时返回 `None`
    ///
    /// 传输层用它在 TCP 字节流中切分完整帧。
    pub fn peek_size(buf: &[u8]) -> Option<usize> {
        if buf.len() < Self::SIZE {
            return None;
        }
        let mut size = &buf[8..12];
        Some(size.get_u32_le() as usize)
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.command.into());
        buf.put_u32_le(self.command_id);
        buf.put_u32_le(self.size);
    }

    /// 解析帧头并校验整帧长度，返回帧头和负载
    pub fn decode(frame: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        if frame.len() < Self::SIZE {
            return Err(ProtocolError::InvalidLength {
                expected: Self::SIZE,
                actual: frame.len(),
            });
        }
        let mut buf = frame;
        let raw_command = buf.get_u32_le();
        let command =
            Command::try_from(raw_command).map_err(|_| ProtocolError::UnknownCommand(raw_command))?;
        let command_id = buf.get_u32_le();
        let size = buf.get_u32_le();
        if size as usize != frame.len() {
            return Err(ProtocolError::SizeMismatch {
                declared: size as usize,
                actual: frame.len(),
            });
        }
        Ok((
            Self {
                command,
                command_id,
                size,
            },
            &frame[Self::SIZE..],
        ))
    }
}

fn encode_frame(command: Command, command_id: u32, payload: &[u8]) -> Bytes {
    let header = CommandHeader::new(command, command_id, payload.len());
    let mut buf = BytesMut::with_capacity(header.size as usize);
    header.encode_into(&mut buf);
    buf.put_slice(payload);
    buf.freeze()
}

fn decode_status<E: TryFrom<u8>>(payload: &[u8]) -> Result<E, ProtocolError> {
    ensure_len(payload, 1)?;
    decode_enum("status", payload[0])
}

fn put_deviation(buf: &mut BytesMut, deviation: &Deviation) {
    buf.put_f64_le(deviation.translation);
    buf.put_f64_le(deviation.rotation);
    buf.put_f64_le(deviation.elbow);
}

fn get_deviation(buf: &mut &[u8]) -> Deviation {
    Deviation {
        translation: buf.get_f64_le(),
        rotation: buf.get_f64_le(),
        elbow: buf.get_f64_le(),
    }
}

// ============================================================================
// Request
// ============================================================================

/// 握手请求：库版本 + 客户端 UDP 端口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    pub version: u16,
    pub udp_port: u16,
}

/// Move 请求：一次性设置控制器模式与运动发生器模式
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveRequest {
    pub controller_mode: ControllerMode,
    /// `Idle` 表示纯力矩控制
    pub motion_generator_mode: MotionGeneratorMode,
    pub maximum_path_deviation: Deviation,
    pub maximum_goal_deviation: Deviation,
}

/// 客户端 → 控制器的请求
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Request {
    Connect(ConnectRequest),
    StartMotionGenerator(MotionGeneratorType),
    StopMotionGenerator,
    SetControllerMode(ControllerMode),
    Move(MoveRequest),
    StopMove,
}

impl Request {
    pub fn command(&self) -> Command {
        match self {
            Self::Connect(_) => Command::Connect,
            Self::StartMotionGenerator(_) => Command::StartMotionGenerator,
            Self::StopMotionGenerator => Command::StopMotionGenerator,
            Self::SetControllerMode(_) => Command::SetControllerMode,
            Self::Move(_) => Command::Move,
            Self::StopMove => Command::StopMove,
        }
    }

    /// 编码为完整帧
    pub fn encode(&self, command_id: u32) -> Bytes {
        let mut payload = BytesMut::new();
        match self {
            Self::Connect(req) => {
                payload.put_u16_le(req.version);
                payload.put_u16_le(req.udp_port);
            },
            Self::StartMotionGenerator(ty) => payload.put_u8((*ty).into()),
            Self::SetControllerMode(mode) => payload.put_u8((*mode).into()),
            Self::Move(req) => {
                payload.put_u8(req.controller_mode.into());
                payload.put_u8(req.motion_generator_mode.into());
                put_deviation(&mut payload, &req.maximum_path_deviation);
                put_deviation(&mut payload, &req.maximum_goal_deviation);
            },
            Self::StopMotionGenerator | Self::StopMove => {},
        }
        encode_frame(self.command(), command_id, &payload)
    }

    /// 解码完整帧（控制器侧 / 测试用）
    pub fn decode(frame: &[u8]) -> Result<(CommandHeader, Self), ProtocolError> {
        let (header, payload) = CommandHeader::decode(frame)?;
        let mut buf = payload;
        let request = match header.command {
            Command::Connect => {
                ensure_len(payload, 4)?;
                Self::Connect(ConnectRequest {
                    version: buf.get_u16_le(),
                    udp_port: buf.get_u16_le(),
                })
            },
            Command::StartMotionGenerator => {
                ensure_len(payload, 1)?;
                Self::StartMotionGenerator(decode_enum("motion_generator_type", payload[0])?)
            },
            Command::StopMotionGenerator => {
                ensure_len(payload, 0)?;
                Self::StopMotionGenerator
            },
            Command::SetControllerMode => {
                ensure_len(payload, 1)?;
                Self::SetControllerMode(decode_enum("controller_mode", payload[0])?)
            },
            Command::Move => {
                ensure_len(payload, 2 + 6 * 8)?;
                let controller_mode = decode_enum("controller_mode", buf.get_u8())?;
                let motion_generator_mode = decode_enum("motion_generator_mode", buf.get_u8())?;
                Self::Move(MoveRequest {
                    controller_mode,
                    motion_generator_mode,
                    maximum_path_deviation: get_deviation(&mut buf),
                    maximum_goal_deviation: get_deviation(&mut buf),
                })
            },
            Command::StopMove => {
                ensure_len(payload, 0)?;
                Self::StopMove
            },
        };
        Ok((header, request))
    }
}

// ============================================================================
// Response
// ============================================================================

/// 握手应答：状态 + 控制器协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectResponse {
    pub status: ConnectStatus,
    pub version: u16,
}

/// 控制器 → 客户端的应答
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Connect(ConnectResponse),
    StartMotionGenerator(StartMotionGeneratorStatus),
    StopMotionGenerator(StopMotionGeneratorStatus),
    SetControllerMode(SetControllerModeStatus),
    Move(MoveStatus),
    StopMove(StopMoveStatus),
}

impl Response {
    /// 最长应答帧（Connect：状态 + 版本）
    pub const MAX_SIZE: usize = CommandHeader::SIZE + 3;

    pub fn command(&self) -> Command {
        match self {
            Self::Connect(_) => Command::Connect,
            Self::StartMotionGenerator(_) => Command::StartMotionGenerator,
            Self::StopMotionGenerator(_) => Command::StopMotionGenerator,
            Self::SetControllerMode(_) => Command::SetControllerMode,
            Self::Move(_) => Command::Move,
            Self::StopMove(_) => Command::StopMove,
        }
    }

    /// 编码为完整帧（控制器侧 / 测试用）
    pub fn encode(&self, command_id: u32) -> Bytes {
        let mut payload = BytesMut::new();
        match self {
            Self::Connect(resp) => {
                payload.put_u8(resp.status.into());
                payload.put_u16_le(resp.version);
            },
            Self::StartMotionGenerator(status) => payload.put_u8((*status).into()),
            Self::StopMotionGenerator(status) => payload.put_u8((*status).into()),
            Self::SetControllerMode(status) => payload.put_u8((*status).into()),
            Self::Move(status) => payload.put_u8((*status).into()),
            Self::StopMove(status) => payload.put_u8((*status).into()),
        }
        encode_frame(self.command(), command_id, &payload)
    }

    pub fn decode(frame: &[u8]) -> Result<(CommandHeader, Self), ProtocolError> {
        let (header, payload) = CommandHeader::decode(frame)?;
        let response = match header.command {
            Command::Connect => {
                ensure_len(payload, 3)?;
                let mut buf = payload;
                let status = decode_enum("status", buf.get_u8())?;
                Self::Connect(ConnectResponse {
                    status,
                    version: buf.get_u16_le(),
                })
            },
            Command::StartMotionGenerator => Self::StartMotionGenerator(decode_status(payload)?),
            Command::StopMotionGenerator => Self::StopMotionGenerator(decode_status(payload)?),
            Command::SetControllerMode => Self::SetControllerMode(decode_status(payload)?),
            Command::Move => Self::Move(decode_status(payload)?),
            Command::StopMove => Self::StopMove(decode_status(payload)?),
        };
        Ok((header, response))
    }
}
