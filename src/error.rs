//! Error types for YuMi control operations

use thiserror::Error;

use crate::codec::{RawResponse, RequestPacket};

pub type Result<T> = std::result::Result<T, YumiError>;

#[derive(Error, Debug)]
pub enum YumiError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The controller is in a state the client cannot fix remotely
    /// (emergency stop, system failure, wrong operation mode).
    #[error("Controller error: {0}")]
    ControllerFatal(String),

    #[error("RWS error: {0}")]
    Rws(String),

    /// Socket-level failure: timeout, broken connection, empty or
    /// malformed response. Recoverable only by a full reconnect.
    #[error("Communication failure: {0}")]
    Comm(String),

    /// The RAPID server rejected a command (result code 0).
    #[error("Command failed: {}", .response.message)]
    Control {
        packet: RequestPacket,
        response: RawResponse,
    },

    /// IK/FK could not produce a solution for the requested target.
    #[error("Kinematics failure: {0}")]
    Kinematics(String),

    /// RAPID tasks stopped while a motion was outstanding.
    #[error("RAPID program stopped during motion")]
    ProgramStopped,

    /// Surfaced after recovery from a mid-motion program stop; the true
    /// cause is in the robot event log.
    #[error("Impossible motion")]
    ImpossibleMotion,

    #[error("Invalid joints: {0}")]
    InvalidJoints(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Tokio task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP digest auth error: {0}")]
    Digest(#[from] diqwest::error::Error),
}
