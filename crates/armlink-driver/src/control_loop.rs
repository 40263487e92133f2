//! 回调驱动的控制循环
//!
//! 每个控制周期把最新状态和距上一状态经过的时间交给 [`Operation`]，
//! 由它给出本周期的指令或 [`Step::Stop`]。
//!
//! - 第一次回调的 `elapsed` 为零，之后为相邻两条状态 `message_id` 之差（毫秒）
//! - `Stop` 之后持续发送带结束标志的最后一条指令，直到控制器报告 Idle
//! - 任何错误都会先尽力取消运动，再返回给调用方

use std::time::Duration;

use armlink_net::{NetError, Transport};
use armlink_protocol::{
    CONTROL_PERIOD, ControllerCommand, ControllerMode, MotionGeneratorCommand, MotionGeneratorMode,
    RobotState,
};
use tracing::{debug, error, info};

use crate::{DriverError, RealtimeConfig, RobotImpl};

/// 回调结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step<T> {
    /// 本周期的目标值，继续循环
    Continue(T),
    /// 结束运动
    Stop,
}

impl<T> Step<T> {
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Self::Continue(value) => Step::Continue(f(value)),
            Self::Stop => Step::Stop,
        }
    }
}

/// 一个周期要发送的指令
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopCommand {
    pub motion: Option<MotionGeneratorCommand>,
    pub control: Option<ControllerCommand>,
}

impl LoopCommand {
    fn validate(&self) -> Result<(), DriverError> {
        if self.motion.as_ref().is_some_and(|m| !m.is_finite()) {
            return Err(DriverError::InvalidCommand(
                "motion command contains NaN or infinite values".to_string(),
            ));
        }
        if self.control.as_ref().is_some_and(|c| !c.is_finite()) {
            return Err(DriverError::InvalidCommand(
                "torque command contains NaN or infinite values".to_string(),
            ));
        }
        Ok(())
    }
}

/// 控制操作：每个周期根据状态给出下一条指令
pub trait Operation {
    fn next(&mut self, state: &RobotState, elapsed: Duration) -> Result<Step<LoopCommand>, DriverError>;
}

impl<F> Operation for F
where
    F: FnMut(&RobotState, Duration) -> Result<Step<LoopCommand>, DriverError>,
{
    fn next(&mut self, state: &RobotState, elapsed: Duration) -> Result<Step<LoopCommand>, DriverError> {
        self(state, elapsed)
    }
}

pub struct ControlLoop<'a, T: Transport, O: Operation> {
    robot: &'a mut RobotImpl<T>,
    operation: O,
    controller_mode: ControllerMode,
    motion_generator_mode: MotionGeneratorMode,
}

impl<'a, T: Transport, O: Operation> ControlLoop<'a, T, O> {
    /// `motion_generator_mode` 为 `Idle` 表示纯力矩控制
    pub fn new(
        robot: &'a mut RobotImpl<T>,
        operation: O,
        controller_mode: ControllerMode,
        motion_generator_mode: MotionGeneratorMode,
    ) -> Self {
        Self {
            robot,
            operation,
            controller_mode,
            motion_generator_mode,
        }
    }

    /// 运行到回调返回 `Stop` 且运动正常结束，或出错为止
    pub fn run(mut self) -> Result<(), DriverError> {
        apply_realtime(self.robot.config().realtime)?;

        let path = self.robot.config().maximum_path_deviation;
        let goal = self.robot.config().maximum_goal_deviation;
        let motion_id =
            self.robot
                .start_motion(self.controller_mode, self.motion_generator_mode, path, goal)?;

        match self.spin(motion_id) {
            Ok(()) => {
                debug!(
                    "Control loop finished, command ratio {:.1}%",
                    self.robot.metrics().snapshot().command_ratio()
                );
                Ok(())
            },
            Err(e) => {
                error!("Control loop aborted: {}", e);
                self.robot.cancel_motion(motion_id);
                Err(e)
            },
        }
    }

    fn spin(&mut self, motion_id: u32) -> Result<(), DriverError> {
        let mut state = match self.robot.last_state() {
            Some(state) => state.clone(),
            None => self.robot.update(None, None)?.ok_or(NetError::Closed)?,
        };
        let mut previous_id = state.message_id;
        let mut last = LoopCommand::default();

        loop {
            let ticks = state.message_id.saturating_sub(previous_id);
            let elapsed = CONTROL_PERIOD * u32::try_from(ticks).unwrap_or(u32::MAX);
            previous_id = state.message_id;

            match self.operation.next(&state, elapsed)? {
                Step::Continue(command) => {
                    command.validate()?;
                    last = command;
                    state = self
                        .robot
                        .update(last.motion.as_ref(), last.control.as_ref())?
                        .ok_or(NetError::Closed)?;
                },
                Step::Stop => {
                    return self.robot.finish_motion(
                        motion_id,
                        last.motion.as_ref(),
                        last.control.as_ref(),
                    );
                },
            }
        }
    }
}

/// 按配置提升当前线程优先级
pub fn apply_realtime(config: RealtimeConfig) -> Result<(), DriverError> {
    match config {
        RealtimeConfig::Ignore => Ok(()),
        RealtimeConfig::Enforce => raise_thread_priority(),
    }
}

#[cfg(feature = "realtime")]
fn raise_thread_priority() -> Result<(), DriverError> {
    use thread_priority::{ThreadPriority, set_current_thread_priority};

    set_current_thread_priority(ThreadPriority::Max).map_err(|e| {
        DriverError::Realtime(format!(
            "failed to raise control thread priority: {:?}. \
            On Linux, you may need CAP_SYS_NICE or rtkit",
            e
        ))
    })?;
    info!("Control thread priority set to MAX (realtime)");
    Ok(())
}

#[cfg(not(feature = "realtime"))]
fn raise_thread_priority() -> Result<(), DriverError> {
    info!("Realtime priority requested without the `realtime` feature");
    Err(DriverError::Realtime(
        "built without the `realtime` feature".to_string(),
    ))
}
