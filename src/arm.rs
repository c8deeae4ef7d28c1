//! Per-arm session against the RAPID motion server.
//!
//! One session owns three sockets: `main` carries motion, gripper,
//! configuration and kinematics traffic; `poses` and `joints` answer state
//! queries so monitoring never blocks behind a long-running motion on
//! `main`.

use std::fmt;
use std::str::FromStr;
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::{
    format_field, format_fields, format_int_fields, pose_body, pose_from_message, CommandCode,
    RawResponse, RequestPacket,
};
use crate::error::{Result, YumiError};
use crate::geometry::{Joint, Pose, METERS_TO_MM, MM_TO_METERS};
use crate::socket::ArmSocket;

pub const JOINTS_PER_ARM: usize = 7;

/// Gripper limits in controller units: 20 N force, 0.02 m opening.
pub const MAX_GRIPPER_FORCE: f64 = 20.0;
pub const MAX_GRIPPER_WIDTH: f64 = 0.02;

/// Capacity of the linear-path buffer in the RAPID server.
pub const MOTION_BUFFER_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmId {
    Left,
    Right,
}

impl ArmId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArmId::Left => "left",
            ArmId::Right => "right",
        }
    }

    /// Joint-name suffix: `l` or `r`.
    pub fn side(&self) -> char {
        match self {
            ArmId::Left => 'l',
            ArmId::Right => 'r',
        }
    }
}

impl fmt::Display for ArmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArmId {
    type Err = YumiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(ArmId::Left),
            "right" => Ok(ArmId::Right),
            other => Err(YumiError::InvalidValue(format!("Unknown arm name: {other}."))),
        }
    }
}

fn joint_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^yumi_joint_([1-7])_(l|r)$").unwrap())
}

/// Checks that `joints` is a full set for the given arm and returns it
/// sorted by joint index, the order the wire format requires.
pub fn validated_joints(arm: ArmId, joints: &[Joint]) -> Result<Vec<Joint>> {
    if joints.len() != JOINTS_PER_ARM {
        return Err(YumiError::InvalidJoints(format!(
            "Expected {JOINTS_PER_ARM} joints, got {}.",
            joints.len()
        )));
    }

    let mut indexed: Vec<(u32, Joint)> = Vec::with_capacity(JOINTS_PER_ARM);
    for joint in joints {
        let captures = joint_name_pattern().captures(&joint.name).ok_or_else(|| {
            YumiError::InvalidJoints(format!("Invalid joint name: {}.", joint.name))
        })?;
        let index: u32 = captures[1]
            .parse()
            .map_err(|_| YumiError::InvalidJoints(format!("Invalid joint name: {}.", joint.name)))?;
        if captures[2].chars().next() != Some(arm.side()) {
            return Err(YumiError::InvalidJoints(format!(
                "Joint {} does not belong to the {arm} arm.",
                joint.name
            )));
        }
        if indexed.iter().any(|(i, _)| *i == index) {
            return Err(YumiError::InvalidJoints(format!(
                "Duplicate joint index in {}.",
                joint.name
            )));
        }
        indexed.push((index, joint.clone()));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, j)| j).collect())
}

fn joints_body(sorted: &[Joint]) -> String {
    format_fields(2, sorted.iter().map(|j| j.value.to_degrees()))
}

enum Route {
    Main,
    Poses,
    Joints,
}

struct Sockets {
    main: ArmSocket,
    poses: ArmSocket,
    joints: ArmSocket,
}

impl Sockets {
    fn close_all(&self) {
        self.main.close();
        self.poses.close();
        self.joints.close();
    }
}

/// Interface to a single arm of the YuMi. All operations are blocking;
/// the coordinator drives them from the blocking thread pool.
pub struct ArmSession {
    name: ArmId,
    ip: String,
    base_port: u16,
    bufsize: usize,
    motion_timeout: Duration,
    comm_timeout: Duration,
    sockets: RwLock<Sockets>,
}

impl ArmSession {
    pub fn connect(
        name: ArmId,
        ip: impl Into<String>,
        base_port: u16,
        bufsize: usize,
        motion_timeout: Duration,
        comm_timeout: Duration,
    ) -> Result<Self> {
        let ip = ip.into();
        let sockets = Self::open_sockets(&ip, base_port, bufsize, comm_timeout)?;
        info!(arm = %name, %ip, base_port, "arm session connected");
        Ok(Self {
            name,
            ip,
            base_port,
            bufsize,
            motion_timeout,
            comm_timeout,
            sockets: RwLock::new(sockets),
        })
    }

    fn open_sockets(
        ip: &str,
        base_port: u16,
        bufsize: usize,
        comm_timeout: Duration,
    ) -> Result<Sockets> {
        Ok(Sockets {
            main: ArmSocket::connect(ip, base_port, comm_timeout, bufsize)?,
            poses: ArmSocket::connect(ip, base_port + 2, comm_timeout, bufsize)?,
            joints: ArmSocket::connect(ip, base_port + 4, comm_timeout, bufsize)?,
        })
    }

    pub fn name(&self) -> ArmId {
        self.name
    }

    /// Closes all three sockets and opens fresh ones. The only legal way
    /// to re-establish a session after recovery; the server accepts a
    /// single client per port, so the old connections go down first.
    pub fn reconnect(&self) -> Result<()> {
        // Shut the old sockets down under the shared lock first: an
        // in-flight request holds the lock until its read returns, and the
        // shutdown is what unblocks that read.
        {
            let guard = self
                .sockets
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.close_all();
        }

        let mut guard = self
            .sockets
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Self::open_sockets(&self.ip, self.base_port, self.bufsize, self.comm_timeout)?;
        info!(arm = %self.name, "arm session reconnected");
        Ok(())
    }

    /// Closes all three sockets for teardown.
    pub fn terminate(&self) {
        debug!(arm = %self.name, "terminating arm session");
        let guard = self
            .sockets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.close_all();
    }

    fn request(
        &self,
        route: Route,
        code: CommandCode,
        body: impl Into<String>,
        timeout: Duration,
    ) -> Result<RawResponse> {
        let packet = RequestPacket::new(code, body, timeout);
        let guard = self
            .sockets
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let socket = match route {
            Route::Main => &guard.main,
            Route::Poses => &guard.poses,
            Route::Joints => &guard.joints,
        };
        let response = socket.send_request(&packet)?;

        if !response.is_success() {
            return Err(YumiError::Control { packet, response });
        }
        Ok(response)
    }

    fn main_request(&self, code: CommandCode, body: impl Into<String>) -> Result<RawResponse> {
        self.request(Route::Main, code, body, self.comm_timeout)
    }

    fn motion_request(&self, code: CommandCode, body: impl Into<String>) -> Result<RawResponse> {
        self.request(Route::Main, code, body, self.motion_timeout)
    }

    // --- state queries -------------------------------------------------

    /// Pings the server on all three sockets.
    pub fn ping(&self) -> Result<()> {
        self.request(Route::Main, CommandCode::Ping, "", self.comm_timeout)?;
        self.request(Route::Poses, CommandCode::Ping, "", self.comm_timeout)?;
        self.request(Route::Joints, CommandCode::Ping, "", self.comm_timeout)?;
        Ok(())
    }

    /// Current TCP pose in the robot base frame, meters.
    pub fn get_pose(&self) -> Result<Pose> {
        let res = self.request(Route::Poses, CommandCode::GetPose, "", self.comm_timeout)?;
        pose_from_message(&res.message)
    }

    /// Current joint angles. With `include_gripper`, the gripper opening
    /// is appended as two extra joints.
    pub fn joints(&self, include_gripper: bool) -> Result<Vec<Joint>> {
        let res = self.request(Route::Joints, CommandCode::GetJoints, "", self.comm_timeout)?;
        let mut joints = self.response_to_joints(&res)?;

        if include_gripper {
            let width = self.get_gripper_width()?;
            joints.push(Joint::new(format!("gripper_{}_joint", self.name.side()), width));
            joints.push(Joint::new(
                format!("gripper_{}_joint_m", self.name.side()),
                width,
            ));
        }

        Ok(joints)
    }

    fn response_to_joints(&self, res: &RawResponse) -> Result<Vec<Joint>> {
        let values = res
            .message
            .split_whitespace()
            .map(|t| t.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| YumiError::Comm(format!("Invalid joints payload: {:?}", res.message)))?;

        if values.len() != JOINTS_PER_ARM {
            return Err(YumiError::Comm(format!(
                "Invalid joints payload: {:?}",
                res.message
            )));
        }

        Ok(values
            .into_iter()
            .enumerate()
            .map(|(i, degrees)| {
                Joint::new(
                    format!("yumi_joint_{}_{}", i + 1, self.name.side()),
                    degrees.to_radians(),
                )
            })
            .collect())
    }

    pub fn joint_names(&self) -> Vec<String> {
        (1..=JOINTS_PER_ARM)
            .map(|i| format!("yumi_joint_{}_{}", i, self.name.side()))
            .collect()
    }

    pub fn lead_through(&self) -> Result<bool> {
        let res = self.main_request(CommandCode::IsLeadThrough, "")?;
        parse_bool_message(&res)
    }

    pub fn set_lead_through(&self, enabled: bool) -> Result<()> {
        self.main_request(CommandCode::SetLeadThrough, format!("{} ", enabled as i32))?;
        Ok(())
    }

    pub fn is_pose_reachable(&self, pose: &Pose) -> Result<bool> {
        let res = self.main_request(CommandCode::IsPoseReachable, pose_body(pose))?;
        parse_bool_message(&res)
    }

    pub fn is_joints_reachable(&self, joints: &[Joint]) -> Result<bool> {
        let sorted = validated_joints(self.name, joints)?;
        let res = self.main_request(CommandCode::IsJointsReachable, joints_body(&sorted))?;
        parse_bool_message(&res)
    }

    pub fn is_gripper_calibrated(&self) -> Result<bool> {
        let res = self.main_request(CommandCode::IsGripperCalibrated, "")?;
        parse_bool_message(&res)
    }

    // --- kinematics ----------------------------------------------------

    /// Joint solution for a base-frame pose. A failure result from the
    /// server means the pose has no solution, not a broken link.
    pub fn ik(&self, pose: &Pose) -> Result<Vec<Joint>> {
        let res = self
            .main_request(CommandCode::Ik, pose_body(pose))
            .map_err(kinematics_error)?;
        self.response_to_joints(&res)
    }

    pub fn fk(&self, joints: &[Joint]) -> Result<Pose> {
        let sorted = validated_joints(self.name, joints)?;
        let res = self
            .main_request(CommandCode::Fk, joints_body(&sorted))
            .map_err(kinematics_error)?;
        pose_from_message(&res.message)
    }

    // --- motion --------------------------------------------------------

    pub fn goto_joints(&self, joints: &[Joint]) -> Result<()> {
        let sorted = validated_joints(self.name, joints)?;
        self.motion_request(CommandCode::GotoJoints, joints_body(&sorted))?;
        Ok(())
    }

    /// Joints move with a controller-side sync barrier; must be issued on
    /// both arms within the motion timeout or the barrier times out.
    pub fn goto_joints_sync(&self, joints: &[Joint]) -> Result<()> {
        let sorted = validated_joints(self.name, joints)?;
        self.motion_request(CommandCode::GotoJointsSync, joints_body(&sorted))?;
        Ok(())
    }

    /// Moves the TCP to a base-frame pose. `linear` selects MoveL over
    /// MoveJ; `relative` computes a delta from the current pose instead.
    pub fn goto_pose(&self, pose: &Pose, linear: bool, relative: bool) -> Result<()> {
        if relative {
            let current = self.get_pose()?;
            let delta = current.delta_to(pose);
            let translation = [
                delta.position.x,
                delta.position.y,
                delta.position.z,
            ];
            return self.goto_pose_delta(translation, Some(delta.euler_degrees()));
        }

        let code = if linear {
            CommandCode::GotoPoseLinear
        } else {
            CommandCode::GotoPose
        };
        self.motion_request(code, pose_body(pose))?;
        Ok(())
    }

    pub fn goto_pose_sync(&self, pose: &Pose) -> Result<()> {
        self.motion_request(CommandCode::GotoPoseSync, pose_body(pose))?;
        Ok(())
    }

    /// Translation in meters (scaled to mm on the wire), rotation as euler
    /// angles in degrees.
    pub fn goto_pose_delta(&self, translation: [f64; 3], rotation: Option<[f64; 3]>) -> Result<()> {
        let mut body = format_fields(1, translation.iter().map(|v| v * METERS_TO_MM));
        if let Some(rotation) = rotation {
            body.push_str(&format_fields(5, rotation));
        }
        self.motion_request(CommandCode::GotoPoseDelta, body)?;
        Ok(())
    }

    /// Circular path: the circle point is latched first, then the move is
    /// executed through it.
    pub fn move_circular(&self, center: &Pose, target: &Pose) -> Result<()> {
        self.main_request(CommandCode::SetCircPoint, pose_body(center))?;
        self.motion_request(CommandCode::MoveByCircPoint, pose_body(target))?;
        Ok(())
    }

    pub fn reset_home(&self) -> Result<()> {
        self.motion_request(CommandCode::ResetHome, "")?;
        Ok(())
    }

    // --- configuration -------------------------------------------------

    /// Redefines the tool frame (TCP offset) used by subsequent motions.
    pub fn set_tool(&self, pose: &Pose) -> Result<()> {
        self.main_request(CommandCode::SetTool, pose_body(pose))?;
        Ok(())
    }

    pub fn set_speed(&self, speed_data: [f64; 4]) -> Result<()> {
        self.main_request(CommandCode::SetSpeed, format_fields(2, speed_data))?;
        Ok(())
    }

    /// Zone data: point_motion flag then (pzone_tcp, pzone_ori, zone_ori).
    pub fn set_zone(&self, point_motion: bool, values: (f64, f64, f64)) -> Result<()> {
        let data = [point_motion as i32 as f64, values.0, values.1, values.2];
        self.main_request(CommandCode::SetZone, format_fields(2, data))?;
        Ok(())
    }

    pub fn set_conf(&self, conf: [i32; 4]) -> Result<()> {
        self.main_request(CommandCode::SetConf, format_int_fields(conf))?;
        Ok(())
    }

    // --- linear-path buffer --------------------------------------------

    pub fn buffer_add_single(&self, pose: &Pose) -> Result<()> {
        self.main_request(CommandCode::BufferAdd, pose_body(pose))?;
        Ok(())
    }

    pub fn buffer_add_all(&self, poses: &[Pose]) -> Result<()> {
        for pose in poses {
            self.buffer_add_single(pose)?;
        }
        Ok(())
    }

    pub fn buffer_clear(&self) -> Result<()> {
        self.main_request(CommandCode::BufferClear, "")?;
        Ok(())
    }

    pub fn buffer_size(&self) -> Result<usize> {
        let res = self.main_request(CommandCode::BufferSize, "")?;
        res.message
            .trim()
            .parse()
            .map_err(|_| YumiError::Comm(format!("Invalid buffer size: {:?}", res.message)))
    }

    /// Executes the buffered linear path. The buffer is not cleared on
    /// success.
    pub fn buffer_move(&self) -> Result<()> {
        self.motion_request(CommandCode::BufferMove, "")?;
        Ok(())
    }

    // --- gripper -------------------------------------------------------

    /// Opens the gripper. Force in newtons (clamped to the gripper
    /// maximum), width in meters; omitting the width opens fully. With
    /// `no_wait` the server returns before the fingers settle.
    pub fn open_gripper(
        &self,
        force: Option<f64>,
        width: Option<f64>,
        no_wait: bool,
    ) -> Result<()> {
        let force = force.unwrap_or(MAX_GRIPPER_FORCE).clamp(0.0, MAX_GRIPPER_FORCE);
        let mut fields = vec![force];
        if let Some(width) = width {
            fields.push(width.clamp(0.0, MAX_GRIPPER_WIDTH) * METERS_TO_MM);
        }
        if no_wait {
            fields.push(0.0);
        }
        self.motion_request(CommandCode::OpenGripper, format_fields(1, fields))?;
        Ok(())
    }

    /// Closes the gripper down to `width` meters with `force` newtons,
    /// both clamped to the gripper limits.
    pub fn close_gripper(&self, force: f64, width: f64, no_wait: bool) -> Result<()> {
        let mut fields = vec![
            force.clamp(0.0, MAX_GRIPPER_FORCE),
            width.clamp(0.0, MAX_GRIPPER_WIDTH) * METERS_TO_MM,
        ];
        if no_wait {
            fields.push(0.0);
        }
        self.motion_request(CommandCode::CloseGripper, format_fields(1, fields))?;
        Ok(())
    }

    pub fn move_gripper(&self, width: f64, no_wait: bool) -> Result<()> {
        let mut fields = vec![width.clamp(0.0, MAX_GRIPPER_WIDTH) * METERS_TO_MM];
        if no_wait {
            fields.push(0.0);
        }
        self.motion_request(CommandCode::MoveGripper, format_fields(1, fields))?;
        Ok(())
    }

    /// Calibrates the gripper. The three parameters must all be given or
    /// the server falls back to its own defaults.
    pub fn calibrate_gripper(
        &self,
        max_speed: Option<f64>,
        hold_force: Option<f64>,
        phys_limit: Option<f64>,
        skip_if_calibrated: bool,
    ) -> Result<()> {
        if skip_if_calibrated && self.is_gripper_calibrated()? {
            debug!(arm = %self.name, "gripper already calibrated");
            return Ok(());
        }

        let body = match (max_speed, hold_force, phys_limit) {
            (Some(speed), Some(force), Some(limit)) => format_fields(1, [speed, force, limit]),
            _ => String::new(),
        };
        self.motion_request(CommandCode::CalibrateGripper, body)?;
        Ok(())
    }

    pub fn set_gripper_force(&self, force: f64) -> Result<()> {
        self.main_request(CommandCode::SetGripperForce, format_field(force, 1) + " ")?;
        Ok(())
    }

    /// Max speed in mm/s.
    pub fn set_gripper_max_speed(&self, max_speed: f64) -> Result<()> {
        self.main_request(
            CommandCode::SetGripperMaxSpeed,
            format_field(max_speed, 1) + " ",
        )?;
        Ok(())
    }

    /// Current opening in meters.
    pub fn get_gripper_width(&self) -> Result<f64> {
        let res = self.main_request(CommandCode::GetGripperWidth, "")?;
        let mm: f64 = res
            .message
            .trim()
            .parse()
            .map_err(|_| YumiError::Comm(format!("Invalid gripper width: {:?}", res.message)))?;
        Ok(mm * MM_TO_METERS)
    }
}

fn kinematics_error(err: YumiError) -> YumiError {
    match err {
        YumiError::Control { response, .. } => YumiError::Kinematics(response.message),
        other => other,
    }
}

fn parse_bool_message(res: &RawResponse) -> Result<bool> {
    match res.message.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(YumiError::Comm(format!("Invalid boolean payload: {other:?}"))),
    }
}
