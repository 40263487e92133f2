//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use armlink_sdk::prelude::*;
//! ```

pub use crate::client::{
    CartesianPose, CartesianVelocities, JointPositions, JointVelocities, MotionTarget, Robot,
    RobotBuilder, RobotError, Step, Torques,
};
pub use crate::driver::{PendingOperation, RealtimeConfig, SessionConfig};
pub use crate::protocol::{ControllerMode, MotionGeneratorMode, RobotMode, RobotState};
