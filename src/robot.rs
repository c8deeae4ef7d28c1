//! Dual-arm coordinator.
//!
//! Owns the RWS client and both arm sessions, brings the controller into a
//! runnable state, serializes motion through a single lock, runs the
//! execution watcher next to every motion, and rebuilds the whole stack
//! when the RAPID program dies under a command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::arm::{ArmId, ArmSession, MAX_GRIPPER_FORCE, MAX_GRIPPER_WIDTH};
use crate::config::Settings;
use crate::error::{Result, YumiError};
use crate::geometry::{make_pose_abs, make_pose_rel, Joint, Pose, METERS_TO_MM};
use crate::rws::{ControllerState, OperationMode, RwsClient};
use crate::supervisor::{self, Supervision};

/// Zone data per named blending radius: (pzone_tcp, pzone_ori, zone_ori).
/// The values are irrelevant for `fine`, which stops exactly on the point.
const ZONE_VALUES: &[(&str, (f64, f64, f64))] = &[
    ("fine", (0.0, 0.0, 0.0)),
    ("z0", (0.3, 0.3, 0.03)),
    ("z1", (1.0, 1.0, 0.1)),
    ("z5", (5.0, 8.0, 0.8)),
    ("z10", (10.0, 15.0, 1.5)),
    ("z15", (15.0, 23.0, 2.3)),
    ("z20", (20.0, 30.0, 3.0)),
    ("z30", (30.0, 45.0, 4.5)),
    ("z50", (50.0, 75.0, 7.5)),
    ("z100", (100.0, 150.0, 15.0)),
    ("z200", (200.0, 300.0, 30.0)),
];

fn zone_values(name: &str) -> Result<(bool, (f64, f64, f64))> {
    ZONE_VALUES
        .iter()
        .find(|(zone, _)| *zone == name)
        .map(|(zone, values)| (*zone == "fine", *values))
        .ok_or_else(|| YumiError::InvalidValue(format!("Unknown zone name: {name}.")))
}

/// Speed number for the RAPID vNNN speed data; loosely, translational
/// speed in mm/s.
pub(crate) fn speed_number(speed_factor: f64, max_tcp_speed: f64) -> i64 {
    let factor = speed_factor.clamp(0.0, 1.0);
    (factor * max_tcp_speed * METERS_TO_MM).round() as i64
}

fn speed_data(n: i64) -> [f64; 4] {
    [n as f64, 500.0, n as f64, 500.0]
}

pub(crate) fn split_by_side(joints: &[Joint]) -> (Vec<Joint>, Vec<Joint>) {
    let left = joints
        .iter()
        .filter(|j| j.name.ends_with("_l"))
        .cloned()
        .collect();
    let right = joints
        .iter()
        .filter(|j| j.name.ends_with("_r"))
        .cloned()
        .collect();
    (left, right)
}

/// State guarded by the motion lock. Holding the guard is what makes a
/// code path "motion class"; the speed cache rides along so it is only
/// ever touched with the lock held.
#[derive(Default)]
struct MotionState {
    speed: Option<i64>,
}

/// Interface to both arms of an ABB YuMi robot.
pub struct Robot {
    settings: Settings,
    rws: RwsClient,
    left: Arc<ArmSession>,
    right: Arc<ArmSession>,
    /// Base frame of the robot expressed in the world frame. Public poses
    /// are world-frame; everything on the wire is base-frame.
    world_pose: Pose,
    motion: tokio::sync::Mutex<MotionState>,
}

impl Robot {
    /// Brings the controller up and connects both arm sessions.
    ///
    /// Fail-fast sequence: AUTO mode check, controller-state check (motors
    /// on if needed), stop a running program, reset the program pointer,
    /// activate and start all tasks, connect the sockets, apply the
    /// default configuration and calibrate the grippers.
    pub async fn new(settings: Settings, world_pose: Pose) -> Result<Self> {
        settings.validate()?;

        let rws = RwsClient::new(
            settings.rws_base_url(),
            settings.username.clone(),
            settings.password.clone(),
        );

        if rws.get_operation_mode().await? != OperationMode::Auto {
            return Err(YumiError::ControllerFatal(
                "Controller is not in AUTO mode.".to_string(),
            ));
        }

        // Mastership stays unclaimed: with it held, RAPID refuses to start.
        match rws.get_controller_state().await? {
            ControllerState::EmergencyStop => {
                return Err(YumiError::ControllerFatal(
                    "Emergency stop is active.".to_string(),
                ));
            }
            ControllerState::SysFail => {
                return Err(YumiError::ControllerFatal(
                    "Robot needs to be restarted.".to_string(),
                ));
            }
            ControllerState::MotorOff => rws.motors_on().await?,
            _ => {}
        }

        if rws.is_running().await? {
            rws.stop_rapid(true).await?;
        }
        rws.reset_pp().await?;
        rws.activate_all_tasks().await?;
        rws.start_rapid(true).await?;

        let left = Self::connect_arm(&settings, ArmId::Left).await?;
        let right = Self::connect_arm(&settings, ArmId::Right).await?;

        let robot = Self {
            settings,
            rws,
            left: Arc::new(left),
            right: Arc::new(right),
            world_pose,
            motion: tokio::sync::Mutex::new(MotionState::default()),
        };

        robot.default_configuration().await?;
        robot.calibrate_grippers().await?;

        if robot.settings.home_on_start {
            robot.reset_home().await?;
        }

        info!("robot ready");
        Ok(robot)
    }

    async fn connect_arm(settings: &Settings, arm: ArmId) -> Result<ArmSession> {
        let ip = settings.ip.clone();
        let base_port = match arm {
            ArmId::Left => settings.base_port_left,
            ArmId::Right => settings.base_port_right,
        };
        let bufsize = settings.bufsize;
        let motion_timeout = settings.motion_timeout();
        let comm_timeout = settings.comm_timeout();

        tokio::task::spawn_blocking(move || {
            ArmSession::connect(arm, ip, base_port, bufsize, motion_timeout, comm_timeout)
        })
        .await?
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn world_pose(&self) -> &Pose {
        &self.world_pose
    }

    pub fn rws(&self) -> &RwsClient {
        &self.rws
    }

    pub fn arm_ids(&self) -> [ArmId; 2] {
        [ArmId::Left, ArmId::Right]
    }

    fn arm(&self, arm: ArmId) -> &Arc<ArmSession> {
        match arm {
            ArmId::Left => &self.left,
            ArmId::Right => &self.right,
        }
    }

    fn arms(&self) -> [&Arc<ArmSession>; 2] {
        [&self.left, &self.right]
    }

    // --- task plumbing -------------------------------------------------

    fn spawn_arm_task<F>(&self, session: &Arc<ArmSession>, op: F) -> JoinHandle<Result<()>>
    where
        F: FnOnce(&ArmSession) -> Result<()> + Send + 'static,
    {
        let session = Arc::clone(session);
        tokio::task::spawn_blocking(move || op(&session))
    }

    async fn wait_for_all(
        &self,
        handles: Vec<JoinHandle<Result<()>>>,
        limit: Duration,
        timeout_message: &str,
    ) -> Result<()> {
        let join_all = async {
            for handle in handles {
                handle.await??;
            }
            Ok::<(), YumiError>(())
        };
        match tokio::time::timeout(limit, join_all).await {
            Ok(result) => result,
            Err(_) => Err(YumiError::Comm(timeout_message.to_string())),
        }
    }

    /// Runs the motion tasks next to the execution watcher and reacts to
    /// whichever finishes first.
    ///
    /// Motion finishes first: cancel the watcher, join it, keep the motion
    /// result. Watcher reports the program stopped: surface
    /// `ProgramStopped` so the caller can run recovery; the still-blocked
    /// motion tasks unblock when recovery tears their sockets down.
    async fn supervise_motions(
        &self,
        handles: Vec<JoinHandle<Result<()>>>,
        overall_timeout: Option<Duration>,
    ) -> Result<()> {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut watcher = tokio::spawn(supervisor::block_while_running(
            self.rws.clone(),
            Arc::clone(&cancel),
        ));

        let motions = async move {
            for handle in handles {
                handle.await??;
            }
            Ok::<(), YumiError>(())
        };
        let motions = async move {
            match overall_timeout {
                Some(limit) => match tokio::time::timeout(limit, motions).await {
                    Ok(result) => result,
                    Err(_) => Err(YumiError::Comm(
                        "Timed out waiting for synchronized motion.".to_string(),
                    )),
                },
                None => motions.await,
            }
        };
        tokio::pin!(motions);

        tokio::select! {
            result = &mut motions => {
                cancel.store(true, Ordering::Relaxed);
                match watcher.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("execution watcher failed: {e}"),
                    Err(e) => warn!("execution watcher died: {e}"),
                }
                result
            }
            watch = &mut watcher => {
                match watch? {
                    Ok(Supervision::ProgramStopped) => Err(YumiError::ProgramStopped),
                    Ok(Supervision::Cancelled) => motions.await,
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Post-wait step of the completion protocol: a program stop triggers
    /// recovery and surfaces as an impossible motion. The motion lock must
    /// already be released.
    async fn resolve_motion(&self, result: Result<()>) -> Result<()> {
        match result {
            Err(YumiError::ProgramStopped) => {
                self.recover().await?;
                // The true cause is in the robot event log.
                Err(YumiError::ImpossibleMotion)
            }
            other => other,
        }
    }

    // --- configuration -------------------------------------------------

    async fn set_v(&self, state: &mut MotionState, speed_factor: f64) -> Result<()> {
        let n = speed_number(speed_factor, self.settings.max_tcp_speed);
        if state.speed == Some(n) {
            return Ok(());
        }

        let data = speed_data(n);
        let handles = self
            .arms()
            .map(|session| self.spawn_arm_task(session, move |arm| arm.set_speed(data)));
        self.wait_for_all(
            handles.into(),
            self.settings.comm_timeout(),
            "Failed to set speed.",
        )
        .await?;

        state.speed = Some(n);
        Ok(())
    }

    /// Applies a named zone setting (`"fine"`, `"z10"`, ...) to both arms.
    pub async fn set_z(&self, name: &str) -> Result<()> {
        let (point_motion, values) = zone_values(name)?;
        let handles = self
            .arms()
            .map(|session| self.spawn_arm_task(session, move |arm| arm.set_zone(point_motion, values)));
        self.wait_for_all(
            handles.into(),
            self.settings.comm_timeout(),
            "Failed to set zone data.",
        )
        .await
    }

    /// Sets the tool frame (TCP offset) on both arms.
    pub async fn set_tool(&self, pose: Pose) -> Result<()> {
        let handles = self
            .arms()
            .map(|session| self.spawn_arm_task(session, move |arm| arm.set_tool(&pose)));
        self.wait_for_all(
            handles.into(),
            self.settings.comm_timeout(),
            "Failed to set tool.",
        )
        .await
    }

    pub async fn calibrate_grippers(&self) -> Result<()> {
        let handles = self.arms().map(|session| {
            self.spawn_arm_task(session, |arm| arm.calibrate_gripper(None, None, None, true))
        });
        self.wait_for_all(
            handles.into(),
            self.settings.motion_timeout(),
            "Failed to calibrate grippers.",
        )
        .await
    }

    async fn default_configuration(&self) -> Result<()> {
        self.set_tool(Pose::identity()).await?;
        self.set_z("fine").await?;

        let handles = self
            .arms()
            .map(|session| self.spawn_arm_task(session, |arm| arm.set_conf([0, 0, 0, 4])));
        self.wait_for_all(
            handles.into(),
            self.settings.comm_timeout(),
            "Failed to set configuration.",
        )
        .await
    }

    // --- recovery ------------------------------------------------------

    /// Recovers from an unhandled stop of the RAPID program (predicted
    /// collision, motion supervision): restart RAPID, reconnect both arm
    /// sessions, reapply the default configuration, forget the cached
    /// speed.
    pub async fn recover(&self) -> Result<()> {
        info!("recovering from stopped program");

        // Sometimes stop+reset is needed before RAPID starts again, and
        // sometimes either fails while the start still succeeds.
        if let Err(e) = self.rws.stop_rapid(true).await {
            warn!("stop during recovery failed: {e}");
        }
        if let Err(e) = self.rws.reset_pp().await {
            warn!("reset PP during recovery failed: {e}");
        }
        self.rws.start_rapid(true).await.map_err(|e| {
            YumiError::ControllerFatal(format!("Failed to recover from stopped program. {e}"))
        })?;

        for session in self.arms() {
            let session = Arc::clone(session);
            tokio::task::spawn_blocking(move || session.reconnect()).await??;
        }

        self.default_configuration().await?;
        self.motion.lock().await.speed = None;
        Ok(())
    }

    // --- state ---------------------------------------------------------

    /// Pings the RAPID server on every socket of both arms.
    pub async fn ping(&self) -> Result<()> {
        let handles = self
            .arms()
            .map(|session| self.spawn_arm_task(session, |arm| arm.ping()));
        self.wait_for_all(
            handles.into(),
            self.settings.comm_timeout(),
            "Failed to ping arms.",
        )
        .await
    }

    /// TCP pose of the given arm in the world frame.
    pub async fn get_end_effector_pose(&self, arm_id: ArmId) -> Result<Pose> {
        let session = Arc::clone(self.arm(arm_id));
        let pose = tokio::task::spawn_blocking(move || session.get_pose()).await??;
        Ok(make_pose_abs(&self.world_pose, &pose))
    }

    /// Joint angles: one arm, or both in parallel when `arm_id` is `None`.
    pub async fn robot_joints(
        &self,
        include_gripper: bool,
        arm_id: Option<ArmId>,
    ) -> Result<Vec<Joint>> {
        if let Some(arm_id) = arm_id {
            let session = Arc::clone(self.arm(arm_id));
            return tokio::task::spawn_blocking(move || session.joints(include_gripper)).await?;
        }

        let left = {
            let session = Arc::clone(&self.left);
            tokio::task::spawn_blocking(move || session.joints(include_gripper))
        };
        let right = {
            let session = Arc::clone(&self.right);
            tokio::task::spawn_blocking(move || session.joints(include_gripper))
        };

        let (mut joints, right_joints) =
            tokio::time::timeout(self.settings.comm_timeout(), async {
                let l = left.await??;
                let r = right.await??;
                Ok::<_, YumiError>((l, r))
            })
            .await
            .map_err(|_| YumiError::Comm("Failed to get joints.".to_string()))??;

        joints.extend(right_joints);
        Ok(joints)
    }

    /// IK for a world-frame pose, solved on the controller.
    pub async fn inverse_kinematics(&self, arm_id: ArmId, pose: Pose) -> Result<Vec<Joint>> {
        let local = make_pose_rel(&self.world_pose, &pose);
        let session = Arc::clone(self.arm(arm_id));
        tokio::task::spawn_blocking(move || session.ik(&local)).await?
    }

    /// FK for a joint set; the result is in the world frame.
    pub async fn forward_kinematics(&self, arm_id: ArmId, joints: Vec<Joint>) -> Result<Pose> {
        let session = Arc::clone(self.arm(arm_id));
        let pose = tokio::task::spawn_blocking(move || session.fk(&joints)).await??;
        Ok(make_pose_abs(&self.world_pose, &pose))
    }

    pub async fn get_hand_teaching_mode(&self, arm_id: ArmId) -> Result<bool> {
        let session = Arc::clone(self.arm(arm_id));
        tokio::task::spawn_blocking(move || session.lead_through()).await?
    }

    pub async fn set_hand_teaching_mode(&self, arm_id: ArmId, enabled: bool) -> Result<()> {
        let session = Arc::clone(self.arm(arm_id));
        tokio::task::spawn_blocking(move || session.set_lead_through(enabled)).await?
    }

    // --- motion --------------------------------------------------------

    /// Moves one arm's TCP to a world-frame pose. `speed` is a 0..1
    /// factor of the configured max TCP speed.
    pub async fn move_to_pose(
        &self,
        target_pose: Pose,
        speed: f64,
        linear: bool,
        arm_id: ArmId,
    ) -> Result<()> {
        let result = {
            let mut state = self.motion.lock().await;
            self.set_v(&mut state, speed).await?;

            let pose = make_pose_rel(&self.world_pose, &target_pose);
            let handle =
                self.spawn_arm_task(self.arm(arm_id), move |arm| arm.goto_pose(&pose, linear, false));
            self.supervise_motions(vec![handle], None).await
        };
        self.resolve_motion(result).await
    }

    /// Moves the arm's TCP to the given pose (linear by default).
    pub async fn move_arm(
        &self,
        arm_id: ArmId,
        pose: Pose,
        speed: f64,
        linear: bool,
    ) -> Result<()> {
        self.move_to_pose(pose, speed, linear, arm_id).await
    }

    /// Commands both arms to assigned world-frame poses in sync; both
    /// motions end at the same time. Both commands must be issued within
    /// the motion timeout or the controller-side barrier expires.
    pub async fn move_both_arms(
        &self,
        left_pose: Pose,
        right_pose: Pose,
        speed: f64,
    ) -> Result<()> {
        let result = {
            let mut state = self.motion.lock().await;
            self.set_v(&mut state, speed).await?;

            let left = make_pose_rel(&self.world_pose, &left_pose);
            let right = make_pose_rel(&self.world_pose, &right_pose);
            let handles = vec![
                self.spawn_arm_task(&self.left, move |arm| arm.goto_pose_sync(&left)),
                self.spawn_arm_task(&self.right, move |arm| arm.goto_pose_sync(&right)),
            ];
            self.supervise_motions(handles, Some(self.settings.motion_timeout()))
                .await
        };
        self.resolve_motion(result).await
    }

    /// Sets target joint values: one arm when `arm_id` is given, else the
    /// list is split by the `_l`/`_r` name suffix into a synchronized
    /// dual-arm move.
    pub async fn move_to_joints(
        &self,
        target_joints: Vec<Joint>,
        speed: f64,
        arm_id: Option<ArmId>,
    ) -> Result<()> {
        let result = {
            let mut state = self.motion.lock().await;
            self.set_v(&mut state, speed).await?;

            match arm_id {
                Some(arm_id) => {
                    let handle = self.spawn_arm_task(self.arm(arm_id), move |arm| {
                        arm.goto_joints(&target_joints)
                    });
                    self.supervise_motions(vec![handle], None).await
                }
                None => {
                    let (left, right) = split_by_side(&target_joints);
                    self.sync_joints_motion(left, right).await
                }
            }
        };
        self.resolve_motion(result).await
    }

    /// Commands both arms to assigned joint states in sync.
    pub async fn goto_joints_sync(&self, left: Vec<Joint>, right: Vec<Joint>) -> Result<()> {
        let result = {
            let _state = self.motion.lock().await;
            self.sync_joints_motion(left, right).await
        };
        self.resolve_motion(result).await
    }

    async fn sync_joints_motion(&self, left: Vec<Joint>, right: Vec<Joint>) -> Result<()> {
        let handles = vec![
            self.spawn_arm_task(&self.left, move |arm| arm.goto_joints_sync(&left)),
            self.spawn_arm_task(&self.right, move |arm| arm.goto_joints_sync(&right)),
        ];
        self.supervise_motions(handles, Some(self.settings.motion_timeout()))
            .await
    }

    /// Sends both arms to their home position.
    pub async fn reset_home(&self) -> Result<()> {
        let handles = self
            .arms()
            .map(|session| self.spawn_arm_task(session, |arm| arm.reset_home()));
        self.wait_for_all(
            handles.into(),
            self.settings.motion_timeout(),
            "Failed to home arms.",
        )
        .await
    }

    // --- gripper actions -----------------------------------------------

    /// Opens the gripper; `force` and `width` are 0..1 factors of the
    /// gripper maximums.
    pub async fn open_gripper(&self, arm_id: ArmId, force: f64, width: f64) -> Result<()> {
        let force = force.clamp(0.0, 1.0) * MAX_GRIPPER_FORCE;
        let width = width.clamp(0.0, 1.0) * MAX_GRIPPER_WIDTH;
        let session = Arc::clone(self.arm(arm_id));
        tokio::task::spawn_blocking(move || {
            session.open_gripper(Some(force), Some(width), false)
        })
        .await?
    }

    /// Closes the gripper; `force` and `width` are 0..1 factors of the
    /// gripper maximums.
    pub async fn close_gripper(&self, arm_id: ArmId, force: f64, width: f64) -> Result<()> {
        let force = force.clamp(0.0, 1.0) * MAX_GRIPPER_FORCE;
        let width = width.clamp(0.0, 1.0) * MAX_GRIPPER_WIDTH;
        let session = Arc::clone(self.arm(arm_id));
        tokio::task::spawn_blocking(move || session.close_gripper(force, width, false)).await?
    }

    /// Opens both grippers fully.
    pub async fn open_grippers(&self) -> Result<()> {
        let handles = self
            .arms()
            .map(|session| self.spawn_arm_task(session, |arm| arm.open_gripper(None, None, false)));
        self.wait_for_all(
            handles.into(),
            self.settings.motion_timeout(),
            "Failed to open grippers.",
        )
        .await
    }

    // --- composite actions ---------------------------------------------

    /// Picks an object off a horizontal surface: approach above the grasp
    /// pose, open, descend, close, retreat.
    pub async fn pick(
        &self,
        arm_id: ArmId,
        pose: Pose,
        approach_speed: f64,
        pick_speed: f64,
        vertical_offset: f64,
    ) -> Result<()> {
        let mut pre_pick = pose;
        pre_pick.position.z += vertical_offset;

        self.move_arm(arm_id, pre_pick, approach_speed, true).await?;
        self.open_gripper(arm_id, 1.0, 1.0).await?;
        self.move_arm(arm_id, pose, pick_speed, true).await?;
        self.close_gripper(arm_id, 1.0, 0.0).await?;
        self.move_arm(arm_id, pre_pick, pick_speed, true).await
    }

    /// Places the held object on a horizontal surface.
    pub async fn place(
        &self,
        arm_id: ArmId,
        pose: Pose,
        approach_speed: f64,
        place_speed: f64,
        vertical_offset: f64,
    ) -> Result<()> {
        let mut pre_place = pose;
        pre_place.position.z += vertical_offset;

        self.move_arm(arm_id, pre_place, approach_speed, true).await?;
        self.move_arm(arm_id, pose, place_speed, true).await?;
        self.open_gripper(arm_id, 1.0, 1.0).await?;
        self.move_arm(arm_id, pre_place, place_speed, true).await?;
        self.close_gripper(arm_id, 1.0, 0.0).await
    }

    // --- teardown ------------------------------------------------------

    /// Closes all six sockets, stops RAPID and turns the motors off.
    pub async fn cleanup(&self) -> Result<()> {
        info!("shutting down robot");

        let handles = self.arms().map(|session| {
            self.spawn_arm_task(session, |arm| {
                arm.terminate();
                Ok(())
            })
        });
        self.wait_for_all(
            handles.into(),
            self.settings.comm_timeout(),
            "Failed to terminate connection.",
        )
        .await?;

        self.rws.stop_rapid(true).await?;
        self.rws.motors_off().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_number_scales_and_clamps() {
        assert_eq!(speed_number(0.5, 1.5), 750);
        assert_eq!(speed_number(1.0, 1.5), 1500);
        assert_eq!(speed_number(2.0, 1.5), 1500);
        assert_eq!(speed_number(-1.0, 1.5), 0);
        assert_eq!(speed_number(0.5, 1.0), 500);
    }

    #[test]
    fn speed_data_layout() {
        assert_eq!(speed_data(750), [750.0, 500.0, 750.0, 500.0]);
    }

    #[test]
    fn zone_lookup() {
        let (point_motion, values) = zone_values("fine").unwrap();
        assert!(point_motion);
        assert_eq!(values, (0.0, 0.0, 0.0));

        let (point_motion, values) = zone_values("z10").unwrap();
        assert!(!point_motion);
        assert_eq!(values, (10.0, 15.0, 1.5));

        assert!(matches!(
            zone_values("z17"),
            Err(YumiError::InvalidValue(_))
        ));
    }

    #[test]
    fn joints_split_by_suffix() {
        let joints: Vec<Joint> = (1..=7)
            .map(|i| Joint::new(format!("yumi_joint_{i}_l"), 0.0))
            .chain((1..=7).map(|i| Joint::new(format!("yumi_joint_{i}_r"), 0.0)))
            .collect();

        let (left, right) = split_by_side(&joints);
        assert_eq!(left.len(), 7);
        assert_eq!(right.len(), 7);
        assert!(left.iter().all(|j| j.name.ends_with("_l")));
        assert!(right.iter().all(|j| j.name.ends_with("_r")));
    }
}
