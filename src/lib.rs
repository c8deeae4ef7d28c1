//! Control client for the ABB YuMi dual-arm robot.
//!
//! Commands a RAPID motion server over per-arm TCP sessions and
//! supervises program execution through the controller's Robot Web
//! Services HTTP API.

pub mod arm;
pub mod codec;
pub mod config;
pub mod error;
pub mod geometry;
pub mod robot;
pub mod rws;
pub mod socket;
pub mod supervisor;

pub use arm::{ArmId, ArmSession, MAX_GRIPPER_FORCE, MAX_GRIPPER_WIDTH};
pub use codec::{CommandCode, RawResponse, RequestPacket, ResultCode};
pub use config::{Settings, MAX_TCP_SPEED};
pub use error::{Result, YumiError};
pub use geometry::{make_pose_abs, make_pose_rel, Joint, Orientation, Pose, Position};
pub use robot::Robot;
pub use rws::{ControllerState, ExecutionState, OperationMode, RapidTask, RwsClient};
pub use socket::ArmSocket;
pub use supervisor::Supervision;
