//! Robot Web Services client.
//!
//! Thin HTTP layer over the controller's REST API: digest auth, the
//! `json=1` response format, expected-status checking with server message
//! extraction, and the RAPID execution/panel/mastership operations the
//! coordinator needs.

use std::str::FromStr;
use std::time::Duration;

use diqwest::WithDigestAuth;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{Result, YumiError};

pub const DEFAULT_USERNAME: &str = "Default User";
pub const DEFAULT_PASSWORD: &str = "robotics";

const STATE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STATE_POLL_ATTEMPTS: u32 = 100;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    Stopped,
}

impl FromStr for ExecutionState {
    type Err = YumiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(ExecutionState::Running),
            "stopped" => Ok(ExecutionState::Stopped),
            other => Err(YumiError::Rws(format!("Unknown execution state: {other}."))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Init,
    MotorOn,
    MotorOff,
    GuardStop,
    EmergencyStop,
    EmergencyStopReset,
    SysFail,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Init => "init",
            ControllerState::MotorOn => "motoron",
            ControllerState::MotorOff => "motoroff",
            ControllerState::GuardStop => "guardstop",
            ControllerState::EmergencyStop => "emergencystop",
            ControllerState::EmergencyStopReset => "emergencystopreset",
            ControllerState::SysFail => "sysfail",
        }
    }
}

impl FromStr for ControllerState {
    type Err = YumiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "init" => Ok(ControllerState::Init),
            "motoron" => Ok(ControllerState::MotorOn),
            "motoroff" => Ok(ControllerState::MotorOff),
            "guardstop" => Ok(ControllerState::GuardStop),
            "emergencystop" => Ok(ControllerState::EmergencyStop),
            "emergencystopreset" => Ok(ControllerState::EmergencyStopReset),
            "sysfail" => Ok(ControllerState::SysFail),
            other => Err(YumiError::Rws(format!("Unknown controller state: {other}."))),
        }
    }
}

/// Operation mode reported by the panel resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Init,
    Auto,
    AutoChange,
    ManualReduced,
    ManualFull,
    ManualFullChange,
    Undefined,
}

impl FromStr for OperationMode {
    type Err = YumiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INIT" => Ok(OperationMode::Init),
            "AUTO" => Ok(OperationMode::Auto),
            "AUTO_CH" => Ok(OperationMode::AutoChange),
            "MANR" => Ok(OperationMode::ManualReduced),
            "MANF" => Ok(OperationMode::ManualFull),
            "MANF_CH" => Ok(OperationMode::ManualFullChange),
            "UNDEF" => Ok(OperationMode::Undefined),
            other => Err(YumiError::Rws(format!("Unknown operation mode: {other}."))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RapidTask {
    pub name: String,
    pub excstate: String,
}

impl RapidTask {
    /// RobotWare reports `star` for a started task in the task list
    /// resource.
    pub fn is_running(&self) -> bool {
        self.excstate == "star"
    }
}

/// Digest-authenticated RWS client. Cheap to clone; clones share the
/// underlying connection pool.
#[derive(Clone)]
pub struct RwsClient {
    base_url: String,
    client: Client,
    username: String,
    password: String,
}

impl RwsClient {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            username: username.into(),
            password: password.into(),
        }
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .query(&[("json", "1")])
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .send_with_digest_auth(&self.username, &self.password)
            .await?;
        Ok(response)
    }

    async fn post(
        &self,
        path: &str,
        form: &[(&str, &str)],
        params: &[(&str, &str)],
    ) -> Result<Response> {
        let mut query = vec![("json", "1")];
        query.extend_from_slice(params);

        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .query(&query)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .form(form)
            .send_with_digest_auth(&self.username, &self.password)
            .await?;
        Ok(response)
    }

    /// Checks the status a call expects; on mismatch pulls the readable
    /// message out of the JSON error body when there is one.
    async fn expect_status(
        &self,
        response: Response,
        expected: StatusCode,
        context: &str,
    ) -> Result<Response> {
        let status = response.status();
        if status == expected {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match extract_status_msg(&body) {
            Some(msg) => YumiError::Rws(format!("{context} {msg}")),
            None => YumiError::Rws(format!("{context} (HTTP {status})")),
        })
    }

    async fn get_json(&self, path: &str, context: &str) -> Result<Value> {
        let response = self.get(path).await?;
        let response = self.expect_status(response, StatusCode::OK, context).await?;
        Ok(response.json().await?)
    }

    // --- state queries -------------------------------------------------

    pub async fn get_operation_mode(&self) -> Result<OperationMode> {
        let value = self
            .get_json("rw/panel/opmode", "Could not get operation mode.")
            .await?;
        embedded_state_field(&value, "opmode")?.parse()
    }

    pub async fn get_controller_state(&self) -> Result<ControllerState> {
        let value = self
            .get_json("rw/panel/ctrlstate", "Could not get controller state.")
            .await?;
        embedded_state_field(&value, "ctrlstate")?.parse()
    }

    pub async fn get_execution_state(&self) -> Result<ExecutionState> {
        let value = self
            .get_json("rw/rapid/execution", "Could not get execution state.")
            .await?;
        embedded_state_field(&value, "ctrlexecstate")?.parse()
    }

    pub async fn is_running(&self) -> Result<bool> {
        Ok(self.get_execution_state().await? == ExecutionState::Running)
    }

    pub async fn is_stopped(&self) -> Result<bool> {
        Ok(self.get_execution_state().await? == ExecutionState::Stopped)
    }

    pub async fn tasks(&self) -> Result<Vec<RapidTask>> {
        let value = self.get_json("rw/rapid/tasks", "Could not get tasks.").await?;
        let state = value
            .pointer("/_embedded/_state")
            .cloned()
            .ok_or_else(|| YumiError::Rws("Could not get tasks.".to_string()))?;
        Ok(serde_json::from_value(state)
            .map_err(|e| YumiError::Rws(format!("Could not get tasks. {e}")))?)
    }

    /// Whether every RAPID task is executing. `is_running` is not enough:
    /// a motion-supervision stop halts a single task while the execution
    /// state stays `running`.
    pub async fn all_tasks_running(&self) -> Result<bool> {
        Ok(self.tasks().await?.iter().all(RapidTask::is_running))
    }

    // --- actions -------------------------------------------------------

    /// Resets the program pointer to the main procedure.
    pub async fn reset_pp(&self) -> Result<()> {
        let response = self
            .post("rw/rapid/execution", &[], &[("action", "resetpp")])
            .await?;
        self.expect_status(response, StatusCode::NO_CONTENT, "Could not reset PP.")
            .await?;
        Ok(())
    }

    pub async fn activate_task(&self, task: &str) -> Result<()> {
        let response = self
            .post(
                &format!("rw/rapid/tasks/{task}"),
                &[],
                &[("action", "activate")],
            )
            .await?;
        self.expect_status(
            response,
            StatusCode::NO_CONTENT,
            &format!("Failed to activate task {task}."),
        )
        .await?;
        Ok(())
    }

    pub async fn activate_all_tasks(&self) -> Result<()> {
        for task in self.tasks().await? {
            self.activate_task(&task.name).await?;
        }
        Ok(())
    }

    /// Starts RAPID execution; with `wait` polls until the controller
    /// reports running.
    pub async fn start_rapid(&self, wait_until_started: bool) -> Result<()> {
        info!("starting RAPID");
        let response = self
            .post(
                "rw/rapid/execution",
                &[
                    ("regain", "continue"),
                    ("execmode", "continue"),
                    ("cycle", "forever"),
                    ("condition", "none"),
                    ("stopatbp", "disabled"),
                    ("alltaskbytsp", "false"),
                ],
                &[("action", "start")],
            )
            .await?;
        self.expect_status(
            response,
            StatusCode::NO_CONTENT,
            "Could not start RAPID. Check operation mode, motor state and write access.",
        )
        .await?;

        if !wait_until_started {
            return Ok(());
        }
        for _ in 0..STATE_POLL_ATTEMPTS {
            if self.is_running().await? {
                return Ok(());
            }
            sleep(STATE_POLL_INTERVAL).await;
        }
        Err(YumiError::Rws("Failed to start RAPID.".to_string()))
    }

    /// Stops RAPID execution; with `wait` polls until the controller
    /// reports stopped.
    pub async fn stop_rapid(&self, wait_until_stopped: bool) -> Result<()> {
        info!("stopping RAPID");
        let response = self
            .post(
                "rw/rapid/execution",
                &[("stopmode", "stop"), ("usetsp", "normal")],
                &[("action", "stop")],
            )
            .await?;
        self.expect_status(
            response,
            StatusCode::NO_CONTENT,
            "Could not stop RAPID execution.",
        )
        .await?;

        if !wait_until_stopped {
            return Ok(());
        }
        for _ in 0..STATE_POLL_ATTEMPTS {
            if self.is_stopped().await? {
                return Ok(());
            }
            sleep(STATE_POLL_INTERVAL).await;
        }
        Err(YumiError::Rws("Failed to stop RAPID.".to_string()))
    }

    /// Turns the motors on. Operation mode has to be AUTO.
    pub async fn motors_on(&self) -> Result<()> {
        self.set_ctrl_state(
            ControllerState::MotorOn,
            "Could not turn on motors. The controller might be in manual mode.",
        )
        .await
    }

    pub async fn motors_off(&self) -> Result<()> {
        self.set_ctrl_state(ControllerState::MotorOff, "Could not turn off motors.")
            .await
    }

    async fn set_ctrl_state(&self, state: ControllerState, context: &str) -> Result<()> {
        debug!(state = state.as_str(), "setting controller state");
        let response = self
            .post(
                "rw/panel/ctrlstate",
                &[("ctrl-state", state.as_str())],
                &[("action", "setctrlstate")],
            )
            .await?;
        self.expect_status(response, StatusCode::NO_CONTENT, context)
            .await?;
        Ok(())
    }

    pub async fn request_mastership(&self) -> Result<()> {
        let response = self
            .post("rw/mastership", &[], &[("action", "request")])
            .await?;
        self.expect_status(
            response,
            StatusCode::NO_CONTENT,
            "Could not get mastership. Try switching to manual and back to auto or restart the controller.",
        )
        .await?;
        Ok(())
    }

    pub async fn release_mastership(&self) -> Result<()> {
        let response = self
            .post("rw/mastership", &[], &[("action", "release")])
            .await?;
        self.expect_status(response, StatusCode::NO_CONTENT, "Could not release mastership.")
            .await?;
        Ok(())
    }

    pub async fn register_remote_user(&self) -> Result<()> {
        let response = self
            .post(
                "users",
                &[
                    ("username", "yumid"),
                    ("application", "yumid"),
                    ("location", "remote"),
                    ("ulocale", "remote"),
                ],
                &[],
            )
            .await?;
        self.expect_status(response, StatusCode::CREATED, "Could not register remote user.")
            .await?;
        Ok(())
    }

    pub async fn login_as_local_user(&self) -> Result<()> {
        let response = self
            .post("users", &[("type", "local")], &[("action", "set-locale")])
            .await?;
        self.expect_status(response, StatusCode::NO_CONTENT, "Could not login as local user.")
            .await?;
        Ok(())
    }

    /// RMMP (Request Manual Mode Privileges) is the manual-mode
    /// counterpart of mastership.
    pub async fn request_rmmp(&self) -> Result<()> {
        let response = self.post("users/rmmp", &[("privilege", "modify")], &[]).await?;
        self.expect_status(response, StatusCode::NO_CONTENT, "Could not get rmmp.")
            .await?;
        Ok(())
    }

    pub async fn cancel_rmmp(&self) -> Result<()> {
        let response = self.post("users/rmmp", &[], &[("action", "cancel")]).await?;
        self.expect_status(response, StatusCode::NO_CONTENT, "Could not cancel rmmp.")
            .await?;
        Ok(())
    }
}

/// Pulls `_embedded._state[0].<field>` out of an RWS payload.
fn embedded_state_field(value: &Value, field: &str) -> Result<String> {
    value
        .pointer(&format!("/_embedded/_state/0/{field}"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| YumiError::Rws(format!("Missing {field} in RWS response.")))
}

/// Pulls `_embedded.status.msg` out of an error body, when parseable.
fn extract_status_msg(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .pointer("/_embedded/status/msg")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_enums_parse() {
        assert_eq!("running".parse::<ExecutionState>().unwrap(), ExecutionState::Running);
        assert!("paused".parse::<ExecutionState>().is_err());

        assert_eq!(
            "emergencystop".parse::<ControllerState>().unwrap(),
            ControllerState::EmergencyStop
        );
        assert_eq!(ControllerState::MotorOn.as_str(), "motoron");
        assert!("warp".parse::<ControllerState>().is_err());

        assert_eq!("AUTO".parse::<OperationMode>().unwrap(), OperationMode::Auto);
        assert_eq!("MANR".parse::<OperationMode>().unwrap(), OperationMode::ManualReduced);
        assert!("SIDEWAYS".parse::<OperationMode>().is_err());
    }

    #[test]
    fn embedded_state_extraction() {
        let value = json!({
            "_embedded": {"_state": [{"opmode": "AUTO"}]}
        });
        assert_eq!(embedded_state_field(&value, "opmode").unwrap(), "AUTO");
        assert!(embedded_state_field(&value, "ctrlstate").is_err());
    }

    #[test]
    fn status_msg_extraction() {
        let body = r#"{"_embedded": {"status": {"code": 400, "msg": "wrong mode"}}}"#;
        assert_eq!(extract_status_msg(body).unwrap(), "wrong mode");
        assert_eq!(extract_status_msg("not json"), None);
        assert_eq!(extract_status_msg(r#"{"other": 1}"#), None);
    }

    #[test]
    fn task_running_flag() {
        let running = RapidTask {
            name: "T_ROB_L".to_string(),
            excstate: "star".to_string(),
        };
        let stopped = RapidTask {
            name: "T_ROB_R".to_string(),
            excstate: "stop".to_string(),
        };
        assert!(running.is_running());
        assert!(!stopped.is_running());
    }

    #[test]
    fn tasks_payload_deserializes() {
        let value = json!({
            "_embedded": {"_state": [
                {"name": "T_ROB_L", "excstate": "star", "type": "normal"},
                {"name": "T_ROB_R", "excstate": "stop", "type": "normal"},
            ]}
        });
        let state = value.pointer("/_embedded/_state").cloned().unwrap();
        let tasks: Vec<RapidTask> = serde_json::from_value(state).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].name, "T_ROB_L");
        assert!(!tasks[1].is_running());
    }
}
