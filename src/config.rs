//! Configuration loading for the YuMi control client

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::error::{Result, YumiError};

/// The YuMi tops out at 1.5 m/s TCP speed.
pub const MAX_TCP_SPEED: f64 = 1.5;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub ip: String,
    #[serde(default = "defaults::max_tcp_speed")]
    pub max_tcp_speed: f64,
    #[serde(default)]
    pub home_on_start: bool,
    #[serde(default = "defaults::base_port_left")]
    pub base_port_left: u16,
    #[serde(default = "defaults::base_port_right")]
    pub base_port_right: u16,
    #[serde(default = "defaults::rws_port")]
    pub rws_port: u16,
    #[serde(default = "defaults::username")]
    pub username: String,
    #[serde(default = "defaults::password")]
    pub password: String,
    /// Seconds; applies to motion and gripper commands.
    #[serde(default = "defaults::motion_timeout")]
    pub motion_timeout: f64,
    /// Seconds; applies to queries and configuration commands.
    #[serde(default = "defaults::comm_timeout")]
    pub comm_timeout: f64,
    #[serde(default = "defaults::bufsize")]
    pub bufsize: usize,
}

mod defaults {
    pub fn max_tcp_speed() -> f64 {
        super::MAX_TCP_SPEED
    }
    pub fn base_port_left() -> u16 {
        5000
    }
    pub fn base_port_right() -> u16 {
        5001
    }
    pub fn rws_port() -> u16 {
        80
    }
    pub fn username() -> String {
        "Default User".to_string()
    }
    pub fn password() -> String {
        "robotics".to_string()
    }
    pub fn motion_timeout() -> f64 {
        20.0
    }
    pub fn comm_timeout() -> f64 {
        5.0
    }
    pub fn bufsize() -> usize {
        4096
    }
}

impl Settings {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            max_tcp_speed: defaults::max_tcp_speed(),
            home_on_start: false,
            base_port_left: defaults::base_port_left(),
            base_port_right: defaults::base_port_right(),
            rws_port: defaults::rws_port(),
            username: defaults::username(),
            password: defaults::password(),
            motion_timeout: defaults::motion_timeout(),
            comm_timeout: defaults::comm_timeout(),
            bufsize: defaults::bufsize(),
        }
    }

    pub fn load_from_path(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| YumiError::Config(format!("Failed to read {path}: {e}")))?;
        let settings: Settings = serde_yaml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ip.is_empty() {
            return Err(YumiError::Config("Robot IP must be set.".to_string()));
        }
        if !(self.max_tcp_speed > 0.0 && self.max_tcp_speed <= MAX_TCP_SPEED) {
            return Err(YumiError::Config(format!(
                "Invalid speed: max_tcp_speed must be in (0, {MAX_TCP_SPEED}], got {}.",
                self.max_tcp_speed
            )));
        }
        if self.motion_timeout <= 0.0 || self.comm_timeout <= 0.0 {
            return Err(YumiError::Config("Timeouts must be positive.".to_string()));
        }
        if self.bufsize == 0 {
            return Err(YumiError::Config("bufsize must be positive.".to_string()));
        }
        Ok(())
    }

    pub fn rws_base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.rws_port)
    }

    pub fn motion_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.motion_timeout)
    }

    pub fn comm_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.comm_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_gets_defaults() {
        let settings: Settings = serde_yaml::from_str("ip: 192.168.104.101\n").unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.max_tcp_speed, 1.5);
        assert!(!settings.home_on_start);
        assert_eq!(settings.base_port_left, 5000);
        assert_eq!(settings.base_port_right, 5001);
        assert_eq!(settings.username, "Default User");
        assert_eq!(settings.motion_timeout, 20.0);
        assert_eq!(settings.bufsize, 4096);
        assert_eq!(settings.rws_base_url(), "http://192.168.104.101:80");
    }

    #[test]
    fn speed_bounds_are_enforced() {
        let mut settings = Settings::new("10.0.0.1");
        settings.max_tcp_speed = 2.0;
        assert!(matches!(settings.validate(), Err(YumiError::Config(_))));

        settings.max_tcp_speed = 0.0;
        assert!(matches!(settings.validate(), Err(YumiError::Config(_))));

        settings.max_tcp_speed = 1.5;
        settings.validate().unwrap();
    }

    #[test]
    fn overrides_parse() {
        let yaml = "ip: 127.0.0.1\nmax_tcp_speed: 0.5\nhome_on_start: true\nrws_port: 8080\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.max_tcp_speed, 0.5);
        assert!(settings.home_on_start);
        assert_eq!(settings.rws_base_url(), "http://127.0.0.1:8080");
    }
}
