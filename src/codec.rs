//! Wire codec for the RAPID motion server protocol.
//!
//! One request on the wire is `<opcode> <body>#` where the body is a
//! space-separated sequence of numbers. The response is `<mirror> <result>
//! <message...>` with no framing delimiter.

use std::time::Duration;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{Result, YumiError};
use crate::geometry::{Orientation, Pose, Position, METERS_TO_MM, MM_TO_METERS};

/// Command opcodes understood by the RAPID server, one per SERVER_*.mod
/// instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum CommandCode {
    Ping = 0,
    GotoPoseLinear = 1,
    GotoJoints = 2,
    GetPose = 3,
    GetJoints = 4,
    GotoPose = 5,
    SetTool = 6,
    SetSpeed = 8,
    SetZone = 9,
    SetConf = 10,
    GotoPoseSync = 11,
    GotoJointsSync = 12,
    GotoPoseDelta = 13,
    CloseGripper = 20,
    OpenGripper = 21,
    CalibrateGripper = 22,
    SetGripperMaxSpeed = 23,
    SetGripperForce = 24,
    MoveGripper = 25,
    GetGripperWidth = 26,
    BufferAdd = 30,
    BufferClear = 31,
    BufferSize = 32,
    BufferMove = 33,
    SetCircPoint = 35,
    MoveByCircPoint = 36,
    IsPoseReachable = 40,
    IsJointsReachable = 41,
    Ik = 42,
    Fk = 43,
    SetLeadThrough = 60,
    IsLeadThrough = 61,
    IsGripperCalibrated = 70,
    CloseConnection = 99,
    ResetHome = 100,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum ResultCode {
    Failure = 0,
    Success = 1,
}

/// One framed request: opcode, preformatted body, read timeout.
#[derive(Debug, Clone)]
pub struct RequestPacket {
    pub code: CommandCode,
    pub body: String,
    pub timeout: Duration,
    pub expect_response: bool,
}

impl RequestPacket {
    pub fn new(code: CommandCode, body: impl Into<String>, timeout: Duration) -> Self {
        Self {
            code,
            body: body.into(),
            timeout,
            expect_response: true,
        }
    }

    pub fn encode(&self) -> String {
        format!("{} {}#", i32::from(self.code), self.body)
    }
}

/// Decoded response: the mirrored opcode, a success/failure code, and the
/// remaining payload.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub mirror_code: i32,
    pub result_code: ResultCode,
    pub message: String,
}

impl RawResponse {
    /// Parses the raw ASCII response. Anything without two leading integer
    /// tokens is a communication failure.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut tokens = raw.split_whitespace();

        let (mirror, result) = match (tokens.next(), tokens.next()) {
            (Some(m), Some(r)) => (m, r),
            _ => return Err(YumiError::Comm(format!("Invalid response: {raw:?}"))),
        };

        let mirror_code = mirror
            .parse::<i32>()
            .map_err(|_| YumiError::Comm(format!("Invalid response: {raw:?}")))?;
        let result_code = result
            .parse::<i32>()
            .ok()
            .and_then(|c| ResultCode::try_from(c).ok())
            .ok_or_else(|| YumiError::Comm(format!("Invalid response: {raw:?}")))?;

        Ok(Self {
            mirror_code,
            result_code,
            message: tokens.collect::<Vec<_>>().join(" "),
        })
    }

    pub fn is_success(&self) -> bool {
        self.result_code == ResultCode::Success
    }
}

/// Formats one numeric field at the given precision and strips trailing
/// zeros and a trailing dot. The RAPID parser chokes on `300.00` but
/// accepts `300`.
pub fn format_field(value: f64, precision: usize) -> String {
    let formatted = format!("{value:.precision$}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Joins fields into a body, one trailing space per field as the server
/// expects.
pub fn format_fields<I>(precision: usize, values: I) -> String
where
    I: IntoIterator<Item = f64>,
{
    let mut body = String::new();
    for value in values {
        body.push_str(&format_field(value, precision));
        body.push(' ');
    }
    body
}

/// Integer fields are emitted verbatim; trimming only applies to
/// fractional formatting, where it preserves the value.
pub fn format_int_fields<I>(values: I) -> String
where
    I: IntoIterator<Item = i32>,
{
    let mut body = String::new();
    for value in values {
        body.push_str(&value.to_string());
        body.push(' ');
    }
    body
}

/// Encodes a pose for the wire: `x y z qx qy qz qw`, positions in
/// millimeters, quaternion normalized.
pub fn pose_body(pose: &Pose) -> String {
    let position = pose.position.scaled(METERS_TO_MM);
    let orientation = pose.orientation.normalized();
    format!(
        "{}{}",
        format_fields(2, [position.x, position.y, position.z]),
        format_fields(
            5,
            [orientation.x, orientation.y, orientation.z, orientation.w]
        ),
    )
}

/// Decodes a `x y z qx qy qz qw` payload (positions in millimeters) into a
/// pose in meters.
pub fn pose_from_message(message: &str) -> Result<Pose> {
    let values = message
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| YumiError::Comm(format!("Invalid pose payload: {message:?}")))?;

    if values.len() != 7 {
        return Err(YumiError::Comm(format!(
            "Invalid pose payload: {message:?}"
        )));
    }

    Ok(Pose::new(
        Position::new(values[0], values[1], values[2]).scaled(MM_TO_METERS),
        Orientation::new(values[3], values[4], values[5], values[6]).normalized(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_trimming_drops_trailing_zeros_and_dot() {
        assert_eq!(format_field(300.0, 2), "300");
        assert_eq!(format_field(0.3, 2), "0.3");
        assert_eq!(format_field(0.0, 2), "0");
        assert_eq!(format_field(10.0, 1), "10");
        assert_eq!(format_field(1.25, 2), "1.25");
        assert_eq!(format_field(-0.5, 5), "-0.5");
    }

    #[test]
    fn field_trimming_preserves_value_within_precision() {
        for &value in &[0.0, 0.03, 0.3, 1.0, 10.0, 123.456, -7.25, 2.3] {
            for precision in 2..=5 {
                let reparsed: f64 = format_field(value, precision).parse().unwrap();
                assert!(
                    (reparsed - value).abs() < 10f64.powi(-(precision as i32)) / 2.0 + 1e-12,
                    "value {value} at precision {precision} reparsed as {reparsed}"
                );
            }
        }
    }

    #[test]
    fn int_fields_are_verbatim() {
        assert_eq!(format_int_fields([0, 0, 0, 4]), "0 0 0 4 ");
        assert_eq!(format_int_fields([10]), "10 ");
    }

    #[test]
    fn request_frame_layout() {
        let packet = RequestPacket::new(
            CommandCode::GotoPoseLinear,
            "300 0 200 0 0 0 1 ",
            Duration::from_secs(20),
        );
        assert_eq!(packet.encode(), "1 300 0 200 0 0 0 1 #");
    }

    #[test]
    fn response_parsing() {
        let res = RawResponse::parse("1 1 300.0 0.0 200.0 0.0 0.0 0.0 1.0").unwrap();
        assert_eq!(res.mirror_code, 1);
        assert!(res.is_success());
        assert_eq!(res.message, "300.0 0.0 200.0 0.0 0.0 0.0 1.0");

        let failure = RawResponse::parse("5 0 target outside reach").unwrap();
        assert!(!failure.is_success());
        assert_eq!(failure.message, "target outside reach");

        assert!(RawResponse::parse("").is_err());
        assert!(RawResponse::parse("1").is_err());
        assert!(RawResponse::parse("one two three").is_err());
        assert!(RawResponse::parse("1 7 bogus result code").is_err());
    }

    #[test]
    fn opcodes_match_the_rapid_server() {
        assert_eq!(i32::from(CommandCode::Ping), 0);
        assert_eq!(i32::from(CommandCode::GotoPoseLinear), 1);
        assert_eq!(i32::from(CommandCode::GotoPoseSync), 11);
        assert_eq!(i32::from(CommandCode::CloseGripper), 20);
        assert_eq!(i32::from(CommandCode::BufferMove), 33);
        assert_eq!(i32::from(CommandCode::ResetHome), 100);
        assert_eq!(CommandCode::try_from(42).unwrap(), CommandCode::Ik);
        assert!(CommandCode::try_from(7).is_err());
    }

    #[test]
    fn pose_body_scales_and_trims() {
        let pose = Pose::new(Position::new(0.3, 0.0, 0.2), Orientation::identity());
        assert_eq!(pose_body(&pose), "300 0 200 0 0 0 1 ");
    }

    #[test]
    fn pose_body_normalizes_orientation() {
        let pose = Pose::new(
            Position::new(0.0, 0.0, 0.0),
            Orientation::new(0.0, 0.0, 0.0, 2.0),
        );
        assert_eq!(pose_body(&pose), "0 0 0 0 0 0 1 ");
    }

    #[test]
    fn pose_message_round_trip() {
        let pose = pose_from_message("300 0 200 0 0 0 1").unwrap();
        assert!((pose.position.x - 0.3).abs() < 1e-9);
        assert!((pose.position.z - 0.2).abs() < 1e-9);
        assert!((pose.orientation.w - 1.0).abs() < 1e-9);

        assert!(pose_from_message("300 0 200").is_err());
        assert!(pose_from_message("a b c d e f g").is_err());
    }
}
