//! 读取并打印机械臂状态
//!
//! 用法: cargo run --example read_state -- <robot-ip> [count]

use armlink_sdk::prelude::*;

fn main() -> Result<(), RobotError> {
    armlink_sdk::init_logger();

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "172.16.0.2".to_string());
    let count: u64 = args.next().and_then(|v| v.parse().ok()).unwrap_or(100);

    let robot = Robot::connect(&address)?;
    println!("Connected to {} (server version {})", address, robot.server_version());

    let mut received = 0;
    robot.read(|state| {
        received += 1;
        if received % 10 == 1 {
            println!(
                "#{:<6} mode={:?} q={:.3?}",
                state.message_id, state.robot_mode, state.joint_positions
            );
        }
        received < count
    })?;

    let metrics = robot.metrics();
    println!(
        "Received {} states ({} stale, {} timeouts)",
        metrics.states_received, metrics.states_stale, metrics.receive_timeouts
    );
    Ok(())
}
