//! YuMi control daemon.
//!
//! Brings the robot up from a YAML config, then reads simple newline
//! commands from stdin until EOF or Ctrl+C.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{error, info};

use yumid::{ArmId, Joint, Orientation, Pose, Position, Robot, Settings};

#[derive(Parser)]
#[command(name = "yumid")]
#[command(about = "ABB YuMi dual-arm control client")]
#[command(version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config/default_config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    info!("loading config from {}", args.config);
    let settings = Settings::load_from_path(&args.config).context("Failed to load settings")?;

    info!("connecting to robot at {}", settings.ip);
    let robot = Robot::new(settings, Pose::identity())
        .await
        .context("Robot initialization failed")?;

    info!("robot ready, enter commands (help for a list)");

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut buffer = String::new();

    loop {
        buffer.clear();
        tokio::select! {
            read = reader.read_line(&mut buffer) => {
                match read {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = buffer.trim();
                        if line.is_empty() || line.starts_with('#') {
                            continue;
                        }
                        if line == "quit" {
                            break;
                        }
                        if let Err(e) = run_command(&robot, line).await {
                            error!("command failed: {e}");
                        }
                    }
                    Err(e) => {
                        error!("failed to read stdin: {e}");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    info!("shutting down");
    robot.cleanup().await.context("Shutdown failed")?;
    Ok(())
}

async fn run_command(robot: &Robot, line: &str) -> Result<()> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.as_slice() {
        ["help"] => {
            println!("pose <left|right>");
            println!("joints <left|right>");
            println!("move <left|right> <x> <y> <z> [speed]");
            println!("grip <left|right> <open|close>");
            println!("lead <left|right> <on|off>");
            println!("home");
            println!("quit");
            Ok(())
        }
        ["pose", arm] => {
            let pose = robot.get_end_effector_pose(arm.parse()?).await?;
            println!(
                "{} {} {} {} {} {} {}",
                pose.position.x,
                pose.position.y,
                pose.position.z,
                pose.orientation.x,
                pose.orientation.y,
                pose.orientation.z,
                pose.orientation.w
            );
            Ok(())
        }
        ["joints", arm] => {
            let joints: Vec<Joint> = robot.robot_joints(false, Some(arm.parse()?)).await?;
            for joint in joints {
                println!("{} {:.4}", joint.name, joint.value);
            }
            Ok(())
        }
        ["move", arm, x, y, z, rest @ ..] => {
            let arm: ArmId = arm.parse()?;
            let speed = match rest {
                [] => 0.5,
                [s] => s.parse().context("invalid speed")?,
                _ => return Err(anyhow!("usage: move <arm> <x> <y> <z> [speed]")),
            };
            let target = Pose::new(
                Position::new(
                    x.parse().context("invalid x")?,
                    y.parse().context("invalid y")?,
                    z.parse().context("invalid z")?,
                ),
                Orientation::identity(),
            );
            robot.move_to_pose(target, speed, true, arm).await?;
            println!("ok");
            Ok(())
        }
        ["grip", arm, "open"] => {
            robot.open_gripper(arm.parse()?, 1.0, 1.0).await?;
            println!("ok");
            Ok(())
        }
        ["grip", arm, "close"] => {
            robot.close_gripper(arm.parse()?, 1.0, 0.0).await?;
            println!("ok");
            Ok(())
        }
        ["lead", arm, state @ ("on" | "off")] => {
            robot
                .set_hand_teaching_mode(arm.parse()?, *state == "on")
                .await?;
            println!("ok");
            Ok(())
        }
        ["home"] => {
            robot.reset_home().await?;
            println!("ok");
            Ok(())
        }
        _ => Err(anyhow!("unknown command: {line} (try help)")),
    }
}
