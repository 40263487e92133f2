//! 控制循环引擎与运动发生器状态机
//!
//! `RobotImpl` 在调用线程上完成一个控制周期：
//!
//! 1. 以最近一条状态的 `message_id` 发送指令报文（如有）
//! 2. 阻塞等待下一条状态报文，期间处理 TCP 上到达的异步应答
//! 3. 用新状态校验运动发生器状态并返回
//!
//! 请求/应答（启动、停止、设置控制器模式、Move）也在同一线程上阻塞完成，
//! 等待期间到达的状态报文照常被接受；此时发现的错误会延迟到下一次 `update()` 抛出。

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwapOption;
use armlink_net::{Incoming, NetError, NetTransport, ShutdownHandle, Transport};
use armlink_protocol::{
    CommandHeader, ControllerCommand, ControllerMode, Datagram, Deviation, MotionGeneratorCommand,
    MotionGeneratorMode, MotionGeneratorType, MoveRequest, MoveStatus, Request, Response,
    RobotCommand, RobotState, SetControllerModeStatus, StartMotionGeneratorStatus,
    StopMotionGeneratorStatus, StopMoveStatus,
};
use tracing::{debug, info, trace, warn};

use crate::{
    AtomicMotionGeneratorStatus, DriverError, MotionGeneratorStatus, Session, SessionConfig,
    SessionMetrics,
};

/// 一次等待得到的事件
enum Event {
    /// 新状态（已去重并记录）
    State(RobotState),
    Reply(CommandHeader, Response),
    Closed,
}

pub struct RobotImpl<T: Transport = NetTransport> {
    session: Session<T>,
    config: SessionConfig,
    status: Arc<AtomicMotionGeneratorStatus>,
    /// 启动中/运行中的运动发生器应报告的模式
    expected_mode: MotionGeneratorMode,
    controller_mode: Option<ControllerMode>,
    /// 进行中的 Move 请求 ID
    current_move: Option<u32>,
    /// 提前到达的 Move 最终应答
    move_result: Option<MoveStatus>,
    /// 阻塞等待应答时发现、留到下一次 update 抛出的错误
    deferred_error: Option<DriverError>,
    /// 最近发出的指令，Stopping 期间无新指令时重发
    last_command: Option<RobotCommand>,
    last_state: Option<RobotState>,
    latest: Arc<ArcSwapOption<RobotState>>,
}

impl RobotImpl<NetTransport> {
    /// 连接控制器并完成握手
    pub fn connect(address: &str, config: SessionConfig) -> Result<Self, DriverError> {
        let session = Session::connect(address, &config)?;
        Ok(Self::new(session, config))
    }
}

impl<T: Transport> RobotImpl<T> {
    pub fn new(session: Session<T>, config: SessionConfig) -> Self {
        Self {
            session,
            config,
            status: Arc::new(AtomicMotionGeneratorStatus::default()),
            expected_mode: MotionGeneratorMode::Idle,
            controller_mode: None,
            current_move: None,
            move_result: None,
            deferred_error: None,
            last_command: None,
            last_state: None,
            latest: Arc::new(ArcSwapOption::empty()),
        }
    }

    // ========================================================================
    // 查询
    // ========================================================================

    pub fn server_version(&self) -> u16 {
        self.session.server_version()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> MotionGeneratorStatus {
        self.status.get()
    }

    /// Running 或 Stopping
    pub fn motion_generator_running(&self) -> bool {
        self.status.get().is_running()
    }

    /// 运动发生器状态的共享句柄（跨线程无锁查询）
    pub fn status_handle(&self) -> Arc<AtomicMotionGeneratorStatus> {
        self.status.clone()
    }

    /// 最近一次确认过的控制器模式
    pub fn controller_mode(&self) -> Option<ControllerMode> {
        self.controller_mode
    }

    pub fn last_state(&self) -> Option<&RobotState> {
        self.last_state.as_ref()
    }

    /// 最新状态的共享句柄，每接受一条状态更新一次
    pub fn latest_state_handle(&self) -> Arc<ArcSwapOption<RobotState>> {
        self.latest.clone()
    }

    pub fn metrics(&self) -> Arc<SessionMetrics> {
        self.session.metrics().clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.session.transport().shutdown_handle()
    }

    fn last_message_id(&self) -> Option<u64> {
        self.last_state.as_ref().map(|s| s.message_id)
    }

    // ========================================================================
    // 控制周期
    // ========================================================================

    /// 执行一个控制周期
    ///
    /// 返回 `Ok(None)` 表示控制器关闭了连接（没有更多状态）。
    /// Stopping 期间即使不给指令也会发送带结束标志的指令，直到状态报告 Idle。
    ///
    /// # 错误
    ///
    /// - 超时内没有状态报文：`DriverError::Network(NetError::Timeout)`
    /// - 运动发生器被拒绝或与状态不一致：`DriverError::MotionGenerator`
    /// - 报文无法解析：`DriverError::Protocol`
    pub fn update(
        &mut self,
        motion: Option<&MotionGeneratorCommand>,
        control: Option<&ControllerCommand>,
    ) -> Result<Option<RobotState>, DriverError> {
        if let Some(err) = self.deferred_error.take() {
            return Err(err);
        }
        let stopping = self.status.get() == MotionGeneratorStatus::Stopping;
        if motion.is_some() || control.is_some() || stopping {
            self.send_command(motion, control)?;
        }
        self.poll_state()
    }

    /// 等待下一条状态报文，不发送指令，也不取出延迟的错误
    fn poll_state(&mut self) -> Result<Option<RobotState>, DriverError> {
        let deadline = Instant::now() + self.config.receive_timeout();
        loop {
            match self.next_event(deadline)? {
                Event::State(state) => {
                    self.check_motion_generator(&state)?;
                    return Ok(Some(state));
                },
                Event::Reply(header, response) => self.handle_async_reply(header, response)?,
                Event::Closed => {
                    info!("Robot closed the command connection");
                    return Ok(None);
                },
            }
        }
    }

    fn send_command(
        &mut self,
        motion: Option<&MotionGeneratorCommand>,
        control: Option<&ControllerCommand>,
    ) -> Result<(), DriverError> {
        let Some(state) = self.last_state.as_ref() else {
            debug!("No robot state received yet, command not sent");
            return Ok(());
        };
        let stopping = self.status.get() == MotionGeneratorStatus::Stopping;
        let previous = self.last_command.as_ref().filter(|_| stopping);
        let mut command = RobotCommand {
            message_id: state.message_id,
            motion: match (motion, previous) {
                (Some(motion), _) => motion.clone(),
                (None, Some(previous)) => previous.motion.clone(),
                (None, None) if stopping => MotionGeneratorCommand::hold(state),
                (None, None) => MotionGeneratorCommand::default(),
            },
            control: match (control, previous) {
                (Some(control), _) => control.clone(),
                (None, Some(previous)) => previous.control.clone(),
                (None, None) => ControllerCommand::default(),
            },
        };
        if stopping {
            command.motion.motion_generation_finished = true;
        }
        let message_id = command.message_id;

        match self.session.transport_mut().send_datagram(&command.encode()) {
            Ok(()) => {
                SessionMetrics::incr(&self.session.metrics().commands_sent);
                trace!("Sent command for state {}", message_id);
                self.last_command = Some(command);
                Ok(())
            },
            Err(NetError::NoPeer) => {
                debug!("State sender unknown, command not sent");
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }

    /// 等待下一个有效事件；过期或重复的状态报文被丢弃
    fn next_event(&mut self, deadline: Instant) -> Result<Event, DriverError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let incoming = match self.session.transport_mut().receive(remaining) {
                Ok(incoming) => incoming,
                Err(NetError::Timeout) => {
                    SessionMetrics::incr(&self.session.metrics().receive_timeouts);
                    return Err(NetError::Timeout.into());
                },
                Err(e) => return Err(e.into()),
            };

            match incoming {
                Incoming::State(datagram) => {
                    let state = RobotState::decode(&datagram)?;
                    if let Some(last) = self.last_message_id() {
                        if state.message_id <= last {
                            SessionMetrics::incr(&self.session.metrics().states_stale);
                            trace!("Dropping stale state {} (last {})", state.message_id, last);
                            continue;
                        }
                    }
                    SessionMetrics::incr(&self.session.metrics().states_received);
                    self.latest.store(Some(Arc::new(state.clone())));
                    self.last_state = Some(state.clone());
                    return Ok(Event::State(state));
                },
                Incoming::Reply(frame) => {
                    SessionMetrics::incr(&self.session.metrics().replies_received);
                    let (header, response) = Response::decode(&frame)?;
                    return Ok(Event::Reply(header, response));
                },
                Incoming::Closed => return Ok(Event::Closed),
            }
        }
    }

    fn reset_motion_generator(&mut self) {
        self.status.set(MotionGeneratorStatus::NotStarted);
        self.expected_mode = MotionGeneratorMode::Idle;
        self.last_command = None;
    }

    /// 用新状态校验运动发生器状态
    fn check_motion_generator(&mut self, state: &RobotState) -> Result<(), DriverError> {
        let mode = state.motion_generator_mode;
        match self.status.get() {
            MotionGeneratorStatus::NotStarted => Ok(()),
            MotionGeneratorStatus::Starting => {
                if mode == self.expected_mode {
                    self.status.set(MotionGeneratorStatus::Running);
                    info!("Motion generator {:?} running", mode);
                    Ok(())
                } else if mode.is_idle() {
                    Ok(())
                } else {
                    let expected = self.expected_mode;
                    self.reset_motion_generator();
                    Err(DriverError::MotionGenerator(format!(
                        "robot reports {:?} while starting {:?}",
                        mode, expected
                    )))
                }
            },
            MotionGeneratorStatus::Running => {
                if mode == self.expected_mode {
                    Ok(())
                } else {
                    let expected = self.expected_mode;
                    self.reset_motion_generator();
                    Err(DriverError::MotionGenerator(format!(
                        "motion generator {:?} stopped unexpectedly, robot reports {:?}",
                        expected, mode
                    )))
                }
            },
            MotionGeneratorStatus::Stopping => {
                if mode.is_idle() {
                    self.reset_motion_generator();
                    info!("Motion generator stopped");
                }
                Ok(())
            },
        }
    }

    /// 处理不属于当前阻塞请求的应答
    fn handle_async_reply(&mut self, header: CommandHeader, response: Response) -> Result<(), DriverError> {
        match response {
            Response::StartMotionGenerator(StartMotionGeneratorStatus::Success) => {
                debug!("Late start confirmation (id {})", header.command_id);
                Ok(())
            },
            Response::StartMotionGenerator(status) => {
                if self.status.get() == MotionGeneratorStatus::NotStarted {
                    warn!("Ignoring {:?} start reply without a motion generator", status);
                    return Ok(());
                }
                self.reset_motion_generator();
                Err(DriverError::MotionGenerator(format!(
                    "motion generator rejected by robot: {:?}",
                    status
                )))
            },
            Response::Move(status) if self.current_move == Some(header.command_id) => {
                if status.is_failure() {
                    self.current_move = None;
                    self.reset_motion_generator();
                    return Err(DriverError::MotionGenerator(format!("motion aborted: {:?}", status)));
                }
                if status == MoveStatus::Success {
                    debug!("Motion {} finished", header.command_id);
                    self.move_result = Some(status);
                }
                Ok(())
            },
            other => {
                warn!(
                    "Ignoring unexpected {:?} reply (id {})",
                    other, header.command_id
                );
                Ok(())
            },
        }
    }

    fn defer(&mut self, result: Result<(), DriverError>) {
        if let Err(err) = result {
            if self.deferred_error.is_none() {
                self.deferred_error = Some(err);
            } else {
                warn!("Dropping additional deferred error: {}", err);
            }
        }
    }

    // ========================================================================
    // 请求/应答
    // ========================================================================

    /// 发送请求并阻塞等待对应应答
    fn execute(&mut self, request: Request) -> Result<(u32, Response), DriverError> {
        let command = request.command();
        let command_id = self.session.send(&request)?;
        let deadline = Instant::now() + self.config.command_timeout();
        loop {
            match self.next_event(deadline)? {
                Event::Reply(header, response)
                    if header.command == command && header.command_id == command_id =>
                {
                    debug!("{:?} reply: {:?}", command, response);
                    return Ok((command_id, response));
                },
                Event::Reply(header, response) => {
                    let result = self.handle_async_reply(header, response);
                    self.defer(result);
                },
                Event::State(state) => {
                    let result = self.check_motion_generator(&state);
                    self.defer(result);
                },
                Event::Closed => return Err(NetError::Closed.into()),
            }
        }
    }

    /// 等待状态报文确认运动发生器已进入期望模式
    fn confirm_motion_generator(&mut self, since: Option<u64>) -> Result<(), DriverError> {
        if let Some(state) = self.last_state.clone() {
            if since.is_none_or(|id| state.message_id > id) {
                self.check_motion_generator(&state)?;
            }
        }

        let deadline = Instant::now() + self.config.command_timeout();
        loop {
            match self.status.get() {
                MotionGeneratorStatus::Running => return Ok(()),
                MotionGeneratorStatus::Starting => {},
                _ => {
                    return Err(self.deferred_error.take().unwrap_or_else(|| {
                        DriverError::MotionGenerator(
                            "motion generator stopped before it was confirmed".to_string(),
                        )
                    }));
                },
            }
            if Instant::now() >= deadline {
                let expected = self.expected_mode;
                self.reset_motion_generator();
                return Err(DriverError::MotionGenerator(format!(
                    "robot did not confirm motion generator {:?}",
                    expected
                )));
            }
            match self.poll_state() {
                Ok(Some(_)) => {},
                Ok(None) => {
                    self.reset_motion_generator();
                    return Err(NetError::Closed.into());
                },
                Err(e) => {
                    self.reset_motion_generator();
                    return Err(e);
                },
            }
        }
    }

    /// 启动运动发生器
    ///
    /// 请求被接受后阻塞到状态报文报告同一模式为止。
    ///
    /// # 错误
    ///
    /// - 已有运动发生器：`DriverError::MotionGenerator`，不发送任何请求
    /// - 请求被拒绝：`DriverError::MotionGenerator`，状态保持 NotStarted
    pub fn start_motion_generator(&mut self, generator: MotionGeneratorType) -> Result<(), DriverError> {
        if self.status.get() != MotionGeneratorStatus::NotStarted {
            return Err(DriverError::MotionGenerator(
                "attempted to start multiple motion generators".to_string(),
            ));
        }
        let since = self.last_message_id();
        let (_, response) = self.execute(Request::StartMotionGenerator(generator))?;
        match response {
            Response::StartMotionGenerator(StartMotionGeneratorStatus::Success) => {},
            other => {
                return Err(DriverError::MotionGenerator(format!(
                    "motion generator start rejected: {:?}",
                    other
                )));
            },
        }

        self.expected_mode = generator.into();
        self.status.set(MotionGeneratorStatus::Starting);
        info!("Starting motion generator {:?}", generator);
        self.confirm_motion_generator(since)
    }

    /// 停止运动发生器
    ///
    /// 成功后进入 Stopping：之后的指令都带结束标志，直到状态报文报告 Idle。
    pub fn stop_motion_generator(&mut self) -> Result<(), DriverError> {
        if !self
            .status
            .compare_exchange(MotionGeneratorStatus::Running, MotionGeneratorStatus::Stopping)
        {
            return Err(DriverError::MotionGenerator(
                "no motion generator running".to_string(),
            ));
        }
        let response = match self.execute(Request::StopMotionGenerator) {
            Ok((_, response)) => response,
            Err(e) => {
                // 停止未被确认，恢复为 Running
                self.status
                    .compare_exchange(MotionGeneratorStatus::Stopping, MotionGeneratorStatus::Running);
                return Err(e);
            },
        };
        match response {
            Response::StopMotionGenerator(StopMotionGeneratorStatus::Success) => {
                info!("Stopping motion generator {:?}", self.expected_mode);
                Ok(())
            },
            other => {
                self.status
                    .compare_exchange(MotionGeneratorStatus::Stopping, MotionGeneratorStatus::Running);
                Err(DriverError::MotionGenerator(format!(
                    "motion generator stop rejected: {:?}",
                    other
                )))
            },
        }
    }

    /// 切换控制器模式，阻塞到状态报文确认
    pub fn set_controller_mode(&mut self, mode: ControllerMode) -> Result<(), DriverError> {
        let since = self.last_message_id();
        let (_, response) = self.execute(Request::SetControllerMode(mode))?;
        match response {
            Response::SetControllerMode(SetControllerModeStatus::Success) => {},
            other => {
                return Err(DriverError::MotionGenerator(format!(
                    "controller mode {:?} rejected: {:?}",
                    mode, other
                )));
            },
        }

        let deadline = Instant::now() + self.config.command_timeout();
        loop {
            if let Some(state) = &self.last_state {
                if since.is_none_or(|id| state.message_id > id) && state.controller_mode == mode {
                    self.controller_mode = Some(mode);
                    info!("Controller mode set to {:?}", mode);
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(DriverError::MotionGenerator(format!(
                    "robot did not confirm controller mode {:?}",
                    mode
                )));
            }
            if self.poll_state()?.is_none() {
                return Err(NetError::Closed.into());
            }
        }
    }

    // ========================================================================
    // Move
    // ========================================================================

    /// 发送 Move 请求并等待运动开始
    ///
    /// `motion_generator_mode` 为 `Idle` 表示纯力矩控制。返回运动 ID。
    pub fn start_motion(
        &mut self,
        controller_mode: ControllerMode,
        motion_generator_mode: MotionGeneratorMode,
        maximum_path_deviation: Deviation,
        maximum_goal_deviation: Deviation,
    ) -> Result<u32, DriverError> {
        if self.status.get() != MotionGeneratorStatus::NotStarted || self.current_move.is_some() {
            return Err(DriverError::MotionGenerator(
                "attempted to start multiple motions".to_string(),
            ));
        }
        let since = self.last_message_id();
        self.move_result = None;
        let (motion_id, response) = self.execute(Request::Move(MoveRequest {
            controller_mode,
            motion_generator_mode,
            maximum_path_deviation,
            maximum_goal_deviation,
        }))?;
        match response {
            Response::Move(MoveStatus::MotionStarted) => {},
            other => {
                return Err(DriverError::MotionGenerator(format!(
                    "move command rejected: {:?}",
                    other
                )));
            },
        }

        self.current_move = Some(motion_id);
        self.expected_mode = motion_generator_mode;
        self.status.set(MotionGeneratorStatus::Starting);
        info!(
            "Motion {} started ({:?} controller, {:?} motion generator)",
            motion_id, controller_mode, motion_generator_mode
        );
        if let Err(e) = self.confirm_motion_generator(since) {
            // 控制器已接受 Move，需要显式取消
            self.cancel_motion(motion_id);
            return Err(e);
        }
        self.controller_mode = Some(controller_mode);
        Ok(motion_id)
    }

    /// 结束运动
    ///
    /// 每个周期发送带结束标志的指令，直到状态报文报告 Idle，
    /// 然后等待该运动的最终应答。
    pub fn finish_motion(
        &mut self,
        motion_id: u32,
        motion: Option<&MotionGeneratorCommand>,
        control: Option<&ControllerCommand>,
    ) -> Result<(), DriverError> {
        if self.current_move != Some(motion_id) {
            return Err(DriverError::InvalidOperation(format!(
                "motion {} is not in progress",
                motion_id
            )));
        }
        self.status
            .compare_exchange(MotionGeneratorStatus::Running, MotionGeneratorStatus::Stopping);

        let mut finished = match motion {
            Some(command) => command.clone(),
            None => self
                .last_state
                .as_ref()
                .map(MotionGeneratorCommand::hold)
                .unwrap_or_default(),
        };
        finished.motion_generation_finished = true;

        while self.status.get() == MotionGeneratorStatus::Stopping {
            if self.update(Some(&finished), control)?.is_none() {
                return Err(NetError::Closed.into());
            }
        }
        self.wait_for_move_result(motion_id)
    }

    fn wait_for_move_result(&mut self, motion_id: u32) -> Result<(), DriverError> {
        let deadline = Instant::now() + self.config.command_timeout();
        loop {
            if let Some(result) = self.move_result.take() {
                self.current_move = None;
                return match result {
                    MoveStatus::Success => {
                        info!("Motion {} finished", motion_id);
                        Ok(())
                    },
                    other => Err(DriverError::MotionGenerator(format!(
                        "motion finished with {:?}",
                        other
                    ))),
                };
            }
            if self.current_move != Some(motion_id) {
                return Err(DriverError::MotionGenerator(format!(
                    "motion {} ended without a result",
                    motion_id
                )));
            }
            match self.next_event(deadline)? {
                Event::Reply(header, response) => self.handle_async_reply(header, response)?,
                Event::State(state) => self.check_motion_generator(&state)?,
                Event::Closed => return Err(NetError::Closed.into()),
            }
        }
    }

    /// 尽力取消运动（StopMove），用于控制回调出错后的清理
    ///
    /// 失败只记录日志，会话状态总是被复位。
    pub fn cancel_motion(&mut self, motion_id: u32) {
        warn!("Cancelling motion {}", motion_id);
        match self.execute(Request::StopMove) {
            Ok((_, Response::StopMove(StopMoveStatus::Success))) => {
                debug!("Motion {} cancelled", motion_id);
            },
            Ok((_, other)) => warn!("Failed to cancel motion {}: {:?}", motion_id, other),
            Err(e) => warn!("Failed to cancel motion {}: {}", motion_id, e),
        }
        self.reset_motion_generator();
        self.current_move = None;
        self.move_result = None;
        self.deferred_error = None;
    }
}

impl<T: Transport> Drop for RobotImpl<T> {
    fn drop(&mut self) {
        self.session.transport_mut().close();
    }
}
