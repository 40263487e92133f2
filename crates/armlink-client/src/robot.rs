//! 机器人句柄
//!
//! `Robot` 是会话的用户入口：所有操作都接收 `&self`，在调用线程上同步运行。
//!
//! - 读取与控制操作先抢占会话的操作槽位，冲突时立即返回 `InvalidOperation`，不做网络 IO
//! - 抢占成功后才锁住内部的 `RobotImpl`，锁在整个操作期间持有
//! - 查询（最新状态、运动发生器状态、指标）从不加锁

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use armlink_driver::{
    AtomicMotionGeneratorStatus, ControlLoop, DriverError, LoopCommand, MetricsSnapshot,
    Operation, OperationSlot, PendingOperation, RobotImpl, Session, SessionConfig, SessionMetrics,
    Step,
};
use armlink_net::{NetError, NetTransport, ShutdownHandle, Transport};
use armlink_protocol::{
    ControllerCommand, ControllerMode, MotionGeneratorCommand, MotionGeneratorMode, RobotState,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::types::{
    CartesianPose, CartesianVelocities, JointPositions, JointVelocities, MotionTarget, Torques,
};
use crate::{RobotBuilder, RobotError};

struct Shared<T: Transport> {
    slot: OperationSlot,
    engine: Mutex<RobotImpl<T>>,
    status: Arc<AtomicMotionGeneratorStatus>,
    latest: Arc<ArcSwapOption<RobotState>>,
    server_version: u16,
    shutdown: ShutdownHandle,
    metrics: Arc<SessionMetrics>,
}

/// 机器人会话句柄
///
/// 可以在线程间移动或克隆；克隆出的句柄共享同一个会话和操作槽位。
/// 最后一个句柄被丢弃时连接关闭。
pub struct Robot<T: Transport = NetTransport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for Robot<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Robot<NetTransport> {
    /// 以默认配置连接控制器
    ///
    /// # 错误
    ///
    /// - 连接失败或握手超时：`RobotError::Network`
    /// - 控制器不支持本库的协议版本：`RobotError::IncompatibleVersion`
    pub fn connect(address: &str) -> Result<Self, RobotError> {
        RobotBuilder::new(address).connect()
    }
}

impl<T: Transport> Robot<T> {
    /// 在已建立的传输上握手
    pub fn from_transport(transport: T, config: SessionConfig) -> Result<Self, RobotError> {
        let session = Session::handshake(transport, config.connect_timeout())?;
        Ok(Self::from_engine(RobotImpl::new(session, config)))
    }

    pub fn from_engine(engine: RobotImpl<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: OperationSlot::new(),
                status: engine.status_handle(),
                latest: engine.latest_state_handle(),
                server_version: engine.server_version(),
                shutdown: engine.shutdown_handle(),
                metrics: engine.metrics(),
                engine: Mutex::new(engine),
            }),
        }
    }

    // ==================== 查询 ====================

    pub fn server_version(&self) -> u16 {
        self.shared.server_version
    }

    pub fn motion_generator_running(&self) -> bool {
        self.shared.status.get().is_running()
    }

    /// 最近一条被接受的状态
    pub fn latest_state(&self) -> Option<Arc<RobotState>> {
        self.shared.latest.load_full()
    }

    pub fn pending_operation(&self) -> PendingOperation {
        self.shared.slot.current()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// 用于从其他线程取消阻塞中的操作；取消后会话不可再用
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shared.shutdown.clone()
    }

    // ==================== 读取 ====================

    /// 持续读取状态，直到回调返回 `false` 或控制器关闭连接
    pub fn read<F>(&self, mut callback: F) -> Result<(), RobotError>
    where
        F: FnMut(&RobotState) -> bool,
    {
        let _guard = self.shared.slot.claim(PendingOperation::Reading)?;
        let mut engine = self.shared.engine.lock();
        debug!("Read operation started");
        while let Some(state) = engine.update(None, None)? {
            if !callback(&state) {
                break;
            }
        }
        Ok(())
    }

    /// 读取下一条状态
    pub fn read_once(&self) -> Result<RobotState, RobotError> {
        let _guard = self.shared.slot.claim(PendingOperation::Reading)?;
        let mut engine = self.shared.engine.lock();
        engine
            .update(None, None)?
            .ok_or(RobotError::Network(NetError::Closed))
    }

    // ==================== 控制 ====================

    /// 切换控制器模式后持续读取状态，直到回调返回 `false`
    ///
    /// 确认模式的那条状态是回调收到的第一条。
    pub fn control_idle<F>(&self, controller_mode: ControllerMode, mut callback: F) -> Result<(), RobotError>
    where
        F: FnMut(&RobotState) -> bool,
    {
        let _guard = self.shared.slot.claim(PendingOperation::Controlling {
            controller_mode,
            motion_generator_mode: MotionGeneratorMode::Idle,
        })?;
        let mut engine = self.shared.engine.lock();
        engine.set_controller_mode(controller_mode)?;

        if let Some(state) = engine.last_state().cloned() {
            if !callback(&state) {
                return Ok(());
            }
        }
        while let Some(state) = engine.update(None, None)? {
            if !callback(&state) {
                break;
            }
        }
        Ok(())
    }

    /// 运动控制：每个周期由回调给出 `M` 类型的目标值
    ///
    /// 回调返回 `Step::Stop` 后，最后一个目标值带结束标志持续发送，直到控制器报告运动结束。
    pub fn control_motion<M, F>(&self, mut callback: F, controller_mode: ControllerMode) -> Result<(), RobotError>
    where
        M: MotionTarget,
        F: FnMut(&RobotState, Duration) -> Step<M>,
    {
        let operation = move |state: &RobotState, elapsed: Duration| -> Result<Step<LoopCommand>, DriverError> {
            Ok(callback(state, elapsed).map(|target| LoopCommand {
                motion: Some(motion_command(state, &target)),
                control: None,
            }))
        };
        self.run_loop(operation, controller_mode, M::MODE)
    }

    pub fn control_joint_positions<F>(&self, callback: F, controller_mode: ControllerMode) -> Result<(), RobotError>
    where
        F: FnMut(&RobotState, Duration) -> Step<JointPositions>,
    {
        self.control_motion(callback, controller_mode)
    }

    pub fn control_joint_velocities<F>(&self, callback: F, controller_mode: ControllerMode) -> Result<(), RobotError>
    where
        F: FnMut(&RobotState, Duration) -> Step<JointVelocities>,
    {
        self.control_motion(callback, controller_mode)
    }

    pub fn control_cartesian_pose<F>(&self, callback: F, controller_mode: ControllerMode) -> Result<(), RobotError>
    where
        F: FnMut(&RobotState, Duration) -> Step<CartesianPose>,
    {
        self.control_motion(callback, controller_mode)
    }

    pub fn control_cartesian_velocities<F>(
        &self,
        callback: F,
        controller_mode: ControllerMode,
    ) -> Result<(), RobotError>
    where
        F: FnMut(&RobotState, Duration) -> Step<CartesianVelocities>,
    {
        self.control_motion(callback, controller_mode)
    }

    /// 纯力矩控制（外部控制器，无运动发生器）
    pub fn control_torques<F>(&self, mut callback: F) -> Result<(), RobotError>
    where
        F: FnMut(&RobotState, Duration) -> Step<Torques>,
    {
        let operation = move |state: &RobotState, elapsed: Duration| -> Result<Step<LoopCommand>, DriverError> {
            Ok(callback(state, elapsed).map(|torques| LoopCommand {
                motion: None,
                control: Some(ControllerCommand {
                    joint_torques: torques.0,
                }),
            }))
        };
        self.run_loop(
            operation,
            ControllerMode::ExternalController,
            MotionGeneratorMode::Idle,
        )
    }

    /// 力矩控制叠加运动发生器
    ///
    /// 每个周期先调用运动回调再调用力矩回调；任一回调返回 `Stop` 即结束。
    pub fn control_torques_with_motion<M, FT, FM>(
        &self,
        mut torque_callback: FT,
        mut motion_callback: FM,
    ) -> Result<(), RobotError>
    where
        M: MotionTarget,
        FT: FnMut(&RobotState, Duration) -> Step<Torques>,
        FM: FnMut(&RobotState, Duration) -> Step<M>,
    {
        let operation = move |state: &RobotState, elapsed: Duration| -> Result<Step<LoopCommand>, DriverError> {
            let motion = motion_callback(state, elapsed);
            let torques = torque_callback(state, elapsed);
            Ok(match (motion, torques) {
                (Step::Continue(target), Step::Continue(torques)) => Step::Continue(LoopCommand {
                    motion: Some(motion_command(state, &target)),
                    control: Some(ControllerCommand {
                        joint_torques: torques.0,
                    }),
                }),
                _ => Step::Stop,
            })
        };
        self.run_loop(operation, ControllerMode::ExternalController, M::MODE)
    }

    fn run_loop<O: Operation>(
        &self,
        operation: O,
        controller_mode: ControllerMode,
        motion_generator_mode: MotionGeneratorMode,
    ) -> Result<(), RobotError> {
        let _guard = self.shared.slot.claim(PendingOperation::Controlling {
            controller_mode,
            motion_generator_mode,
        })?;
        let mut engine = self.shared.engine.lock();
        debug!(
            "Control operation started ({:?} controller, {:?} motion generator)",
            controller_mode, motion_generator_mode
        );
        ControlLoop::new(&mut *engine, operation, controller_mode, motion_generator_mode).run()?;
        Ok(())
    }
}

/// 以当前状态为基础写入目标值
fn motion_command<M: MotionTarget>(state: &RobotState, target: &M) -> MotionGeneratorCommand {
    let mut command = MotionGeneratorCommand::hold(state);
    target.write_to(&mut command);
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use armlink_net::{Incoming, MockHandle, MockTransport};
    use armlink_protocol::{
        ConnectResponse, ConnectStatus, Datagram, JOINT_COUNT, MoveStatus, Request, Response,
        RobotCommand, SetControllerModeStatus, StopMoveStatus,
    };
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn state(id: u64, mode: MotionGeneratorMode) -> Bytes {
        RobotState {
            message_id: id,
            motion_generator_mode: mode,
            ..Default::default()
        }
        .encode()
    }

    fn reply(frame: &[u8], response: Response) -> Incoming {
        let (header, _) = Request::decode(frame).unwrap();
        Incoming::Reply(response.encode(header.command_id))
    }

    /// 模拟控制器：应答所有请求，每收到一条指令回一条状态，收到结束标志后报告 Idle 并结束 Move
    fn mock_robot(mode: MotionGeneratorMode) -> (Robot<MockTransport>, MockHandle) {
        let (transport, handle) = MockTransport::new();
        let move_id = Arc::new(AtomicU32::new(u32::MAX));
        let move_id_for_requests = move_id.clone();
        handle.set_request_responder(move |frame| {
            let (header, request) = Request::decode(frame).unwrap();
            match request {
                Request::Connect(_) => vec![reply(
                    frame,
                    Response::Connect(ConnectResponse {
                        status: ConnectStatus::Success,
                        version: 4,
                    }),
                )],
                Request::Move(_) => {
                    move_id_for_requests.store(header.command_id, Ordering::SeqCst);
                    vec![
                        reply(frame, Response::Move(MoveStatus::MotionStarted)),
                        Incoming::State(state(1, mode)),
                    ]
                },
                Request::SetControllerMode(controller_mode) => {
                    let confirmed = RobotState {
                        message_id: 1,
                        controller_mode,
                        ..Default::default()
                    };
                    vec![
                        reply(
                            frame,
                            Response::SetControllerMode(SetControllerModeStatus::Success),
                        ),
                        Incoming::State(confirmed.encode()),
                    ]
                },
                Request::StopMove => vec![reply(frame, Response::StopMove(StopMoveStatus::Success))],
                _ => vec![],
            }
        });

        let mut next_id = 1;
        handle.set_datagram_responder(move |datagram| {
            let command = RobotCommand::decode(datagram).unwrap();
            next_id += 1;
            if command.motion.motion_generation_finished {
                vec![
                    Incoming::State(state(next_id, MotionGeneratorMode::Idle)),
                    Incoming::Reply(
                        Response::Move(MoveStatus::Success).encode(move_id.load(Ordering::SeqCst)),
                    ),
                ]
            } else {
                vec![Incoming::State(state(next_id, mode))]
            }
        });

        let robot = Robot::from_transport(transport, SessionConfig::default()).unwrap();
        (robot, handle)
    }

    fn sent_commands(handle: &MockHandle) -> Vec<RobotCommand> {
        handle
            .datagrams()
            .iter()
            .map(|d| RobotCommand::decode(d).unwrap())
            .collect()
    }

    #[test]
    fn test_from_transport_handshake() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::Idle);
        assert_eq!(robot.server_version(), 4);
        assert_eq!(handle.requests().len(), 1);
        assert!(robot.latest_state().is_none());
        assert!(robot.pending_operation().is_none());
    }

    #[test]
    fn test_read_until_callback_stops() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::Idle);
        for id in 1..=5 {
            handle.push_state(state(id, MotionGeneratorMode::Idle));
        }

        let mut seen = Vec::new();
        robot
            .read(|state| {
                seen.push(state.message_id);
                seen.len() < 3
            })
            .unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(robot.latest_state().unwrap().message_id, 3);
        assert!(robot.pending_operation().is_none());
        assert_eq!(robot.read_once().unwrap().message_id, 4);
    }

    #[test]
    fn test_read_ends_when_connection_closes() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::Idle);
        handle.push_state(state(1, MotionGeneratorMode::Idle));
        handle.push_state(state(2, MotionGeneratorMode::Idle));
        handle.close_remote();

        let mut count = 0;
        robot
            .read(|_| {
                count += 1;
                true
            })
            .unwrap();
        assert_eq!(count, 2);

        assert!(matches!(
            robot.read_once(),
            Err(RobotError::Network(NetError::Closed))
        ));
    }

    #[test]
    fn test_read_times_out() {
        let (transport, handle) = MockTransport::new();
        handle.set_request_responder(|frame| {
            vec![reply(
                frame,
                Response::Connect(ConnectResponse {
                    status: ConnectStatus::Success,
                    version: 1,
                }),
            )]
        });
        let config = SessionConfig {
            receive_timeout_ms: 1,
            ..Default::default()
        };
        let robot = Robot::from_transport(transport, config).unwrap();
        let err = robot.read(|_| true).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(robot.metrics().receive_timeouts, 1);
    }

    #[test]
    fn test_nested_operations_are_rejected() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::Idle);
        handle.push_state(state(1, MotionGeneratorMode::Idle));

        let mut nested = Vec::new();
        robot
            .read(|_| {
                assert_eq!(robot.pending_operation(), PendingOperation::Reading);
                nested.push(robot.read_once().map(|_| ()));
                nested.push(robot.control_torques(|_, _| Step::Stop));
                nested.push(robot.control_idle(ControllerMode::JointImpedance, |_| false));
                false
            })
            .unwrap();

        assert_eq!(nested.len(), 3);
        assert!(
            nested
                .iter()
                .all(|r| matches!(r, Err(RobotError::InvalidOperation(_))))
        );
        // 只有握手请求
        assert_eq!(handle.requests().len(), 1);
        assert!(handle.datagrams().is_empty());
    }

    #[test]
    fn test_concurrent_operation_from_clone_is_rejected() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::Idle);
        handle.push_state(state(1, MotionGeneratorMode::Idle));
        let other = robot.clone();

        robot
            .read(|_| {
                let result = std::thread::scope(|s| s.spawn(|| other.read_once()).join().unwrap());
                assert!(matches!(result, Err(RobotError::InvalidOperation(_))));
                false
            })
            .unwrap();

        // 操作结束后另一个句柄可以继续使用
        handle.push_state(state(2, MotionGeneratorMode::Idle));
        assert_eq!(other.read_once().unwrap().message_id, 2);
    }

    #[test]
    fn test_moved_handle_keeps_reading() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::Idle);
        for id in 1..=4 {
            handle.push_state(state(id, MotionGeneratorMode::Idle));
        }
        assert_eq!(robot.read_once().unwrap().message_id, 1);

        let moved = std::thread::spawn(move || {
            let mut seen = Vec::new();
            let result = robot.read(|state| {
                seen.push(state.message_id);
                seen.len() < 3
            });
            result.map(|_| seen)
        })
        .join()
        .unwrap()
        .unwrap();
        assert_eq!(moved, vec![2, 3, 4]);
    }

    #[test]
    fn test_control_joint_positions() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::JointPosition);
        let target = JointPositions([0.5; JOINT_COUNT]);
        let mut elapsed_log = Vec::new();

        robot
            .control_joint_positions(
                |_, elapsed| {
                    elapsed_log.push(elapsed);
                    if elapsed_log.len() == 3 {
                        Step::Stop
                    } else {
                        Step::Continue(target)
                    }
                },
                ControllerMode::JointImpedance,
            )
            .unwrap();

        assert_eq!(elapsed_log[0], Duration::ZERO);
        assert_eq!(elapsed_log[1], Duration::from_millis(1));
        assert!(!robot.motion_generator_running());
        assert!(robot.pending_operation().is_none());

        let commands = sent_commands(&handle);
        assert_eq!(commands.len(), 3);
        assert!(commands.iter().all(|c| c.motion.joint_positions == target.0));
        assert!(commands[2].motion.motion_generation_finished);

        let (_, request) = Request::decode(&handle.requests()[1]).unwrap();
        let Request::Move(request) = request else {
            panic!("expected a Move request, got {:?}", request);
        };
        assert_eq!(request.controller_mode, ControllerMode::JointImpedance);
        assert_eq!(
            request.motion_generator_mode,
            MotionGeneratorMode::JointPosition
        );
    }

    #[test]
    fn test_control_torques() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::Idle);
        let mut calls = 0;
        robot
            .control_torques(|_, _| {
                calls += 1;
                if calls > 2 {
                    Step::Stop
                } else {
                    Step::Continue(Torques([1.5; JOINT_COUNT]))
                }
            })
            .unwrap();

        let commands = sent_commands(&handle);
        assert_eq!(commands.len(), 3);
        assert!(
            commands
                .iter()
                .all(|c| c.control.joint_torques == [1.5; JOINT_COUNT])
        );

        let (_, request) = Request::decode(&handle.requests()[1]).unwrap();
        let Request::Move(request) = request else {
            panic!("expected a Move request, got {:?}", request);
        };
        assert_eq!(request.controller_mode, ControllerMode::ExternalController);
        assert_eq!(request.motion_generator_mode, MotionGeneratorMode::Idle);
    }

    #[test]
    fn test_control_torques_with_motion_stops_on_either_callback() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::JointVelocity);
        let mut ticks = 0;
        robot
            .control_torques_with_motion(
                |_, _| Step::Continue(Torques::ZERO),
                |_, _| {
                    ticks += 1;
                    if ticks == 2 {
                        Step::Stop
                    } else {
                        Step::Continue(JointVelocities([0.2; JOINT_COUNT]))
                    }
                },
            )
            .unwrap();

        let commands = sent_commands(&handle);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].motion.joint_velocities, [0.2; JOINT_COUNT]);
        assert!(commands[1].motion.motion_generation_finished);
    }

    #[test]
    fn test_invalid_command_releases_operation() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::Idle);
        let err = robot
            .control_torques(|_, _| Step::Continue(Torques([f64::INFINITY; JOINT_COUNT])))
            .unwrap_err();
        assert!(matches!(err, RobotError::InvalidCommand(_)));
        assert!(robot.pending_operation().is_none());
        assert!(!robot.motion_generator_running());

        let (_, last) = Request::decode(handle.requests().last().unwrap()).unwrap();
        assert_eq!(last, Request::StopMove);
    }

    #[test]
    fn test_control_idle_starts_with_confirming_state() {
        let (robot, handle) = mock_robot(MotionGeneratorMode::Idle);
        let mut seen = Vec::new();
        robot
            .control_idle(ControllerMode::CartesianImpedance, |state| {
                seen.push((state.message_id, state.controller_mode));
                false
            })
            .unwrap();
        assert_eq!(seen, vec![(1, ControllerMode::CartesianImpedance)]);

        let (_, request) = Request::decode(&handle.requests()[1]).unwrap();
        assert_eq!(
            request,
            Request::SetControllerMode(ControllerMode::CartesianImpedance)
        );
    }

    #[test]
    fn test_shutdown_handle_cancels_read() {
        let (robot, _handle) = mock_robot(MotionGeneratorMode::Idle);
        robot.shutdown_handle().shutdown();
        assert!(matches!(
            robot.read(|_| true),
            Err(RobotError::Network(NetError::Closed))
        ));
    }
}
