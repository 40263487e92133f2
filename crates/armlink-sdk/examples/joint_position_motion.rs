//! 关节位置控制示例：第 4 关节做一次 5 秒的余弦往返
//!
//! 用法: cargo run --example joint_position_motion -- <robot-ip>
//!
//! 警告：机械臂会运动，请确保工作空间内无障碍物并随时准备按下急停。

use std::f64::consts::PI;

use armlink_sdk::prelude::*;

const DURATION_S: f64 = 5.0;
const AMPLITUDE_RAD: f64 = PI / 8.0;

fn main() -> Result<(), RobotError> {
    armlink_sdk::init_logger();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "172.16.0.2".to_string());
    let robot = RobotBuilder::new(address)
        .realtime(RealtimeConfig::Ignore)
        .connect()?;

    let start = JointPositions::from(&robot.read_once()?);
    let mut time = 0.0;
    robot.control_joint_positions(
        |_state, elapsed| {
            time += elapsed.as_secs_f64();
            if time >= DURATION_S {
                return Step::Stop;
            }
            let delta = AMPLITUDE_RAD * (1.0 - (2.0 * PI * time / DURATION_S).cos()) / 2.0;
            let mut target = start;
            target.0[3] += delta;
            Step::Continue(target)
        },
        ControllerMode::JointImpedance,
    )?;

    println!("Motion finished");
    Ok(())
}
