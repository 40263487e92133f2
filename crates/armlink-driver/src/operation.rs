//! 操作仲裁
//!
//! 同一会话上同一时刻最多只有一个读取或控制操作。
//! 当前操作编码在一个 `AtomicU32` 中，通过 compare-exchange 从 `None` 抢占，
//! 冲突时立即返回 `InvalidOperation`，不做任何网络 IO。
//! [`OperationGuard`] 在任何退出路径（正常返回、错误、panic 展开）上都把槽位恢复为 `None`。

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use armlink_protocol::{ControllerMode, MotionGeneratorMode};

use crate::DriverError;

const KIND_NONE: u32 = 0;
const KIND_READING: u32 = 1;
const KIND_CONTROLLING: u32 = 2;

/// 当前占用会话的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingOperation {
    #[default]
    None,
    Reading,
    Controlling {
        controller_mode: ControllerMode,
        /// `Idle` 表示纯力矩控制或仅设置控制器
        motion_generator_mode: MotionGeneratorMode,
    },
}

impl PendingOperation {
    fn to_bits(self) -> u32 {
        match self {
            Self::None => KIND_NONE,
            Self::Reading => KIND_READING,
            Self::Controlling {
                controller_mode,
                motion_generator_mode,
            } => {
                KIND_CONTROLLING
                    | (u8::from(controller_mode) as u32) << 8
                    | (u8::from(motion_generator_mode) as u32) << 16
            },
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits & 0xFF {
            KIND_READING => Self::Reading,
            KIND_CONTROLLING => Self::Controlling {
                controller_mode: ControllerMode::try_from((bits >> 8) as u8).unwrap_or_default(),
                motion_generator_mode: MotionGeneratorMode::try_from((bits >> 16) as u8)
                    .unwrap_or_default(),
            },
            _ => Self::None,
        }
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "no operation"),
            Self::Reading => write!(f, "a read operation"),
            Self::Controlling {
                controller_mode,
                motion_generator_mode,
            } => write!(
                f,
                "a control operation ({:?} controller, {:?} motion generator)",
                controller_mode, motion_generator_mode
            ),
        }
    }
}

/// 操作槽位
#[derive(Debug, Default)]
pub struct OperationSlot {
    bits: AtomicU32,
}

impl OperationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> PendingOperation {
        PendingOperation::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// 抢占槽位
    ///
    /// # 错误
    ///
    /// 已有操作在进行时返回 `DriverError::InvalidOperation`。
    pub fn claim(&self, operation: PendingOperation) -> Result<OperationGuard<'_>, DriverError> {
        if operation.is_none() {
            return Err(DriverError::InvalidOperation(
                "cannot claim an empty operation".to_string(),
            ));
        }
        match self.bits.compare_exchange(
            KIND_NONE,
            operation.to_bits(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(OperationGuard { slot: self }),
            Err(current) => Err(DriverError::InvalidOperation(format!(
                "cannot start {} while {} is in progress",
                operation,
                PendingOperation::from_bits(current)
            ))),
        }
    }
}

/// 槽位占用凭证，Drop 时释放
#[derive(Debug)]
pub struct OperationGuard<'a> {
    slot: &'a OperationSlot,
}

impl OperationGuard<'_> {
    pub fn operation(&self) -> PendingOperation {
        self.slot.current()
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.slot.bits.store(KIND_NONE, Ordering::Release);
    }
}
