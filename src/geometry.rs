//! Kinematics value types: positions, quaternion orientations, poses and
//! named joints, plus the world/base frame math used by the coordinator.

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

pub const METERS_TO_MM: f64 = 1000.0;
pub const MM_TO_METERS: f64 = 1.0 / METERS_TO_MM;

/// Cartesian position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Uniform scale, used for the m↔mm conversion at the wire boundary.
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl From<Translation3<f64>> for Position {
    fn from(t: Translation3<f64>) -> Self {
        Self::new(t.x, t.y, t.z)
    }
}

/// Orientation as a quaternion in (x, y, z, w) component order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Orientation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Orientation {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Unit-length copy. Poses are normalized before they go on the wire.
    pub fn normalized(self) -> Self {
        Self::from_unit_quaternion(&self.as_unit_quaternion())
    }

    pub fn as_unit_quaternion(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_quaternion(Quaternion::new(self.w, self.x, self.y, self.z))
    }

    pub fn from_unit_quaternion(q: &UnitQuaternion<f64>) -> Self {
        Self::new(q.i, q.j, q.k, q.w)
    }
}

/// Rigid transform: position plus unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    pub orientation: Orientation,
}

impl Pose {
    pub fn new(position: Position, orientation: Orientation) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn as_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(self.position.x, self.position.y, self.position.z),
            self.orientation.as_unit_quaternion(),
        )
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self::new(
            iso.translation.into(),
            Orientation::from_unit_quaternion(&iso.rotation),
        )
    }

    pub fn inverse(&self) -> Self {
        Self::from_isometry(&self.as_isometry().inverse())
    }

    /// Delta transform from `self` to `target`: `self⁻¹ · target`.
    pub fn delta_to(&self, target: &Pose) -> Pose {
        Pose::from_isometry(&(self.as_isometry().inverse() * target.as_isometry()))
    }

    /// Rotation part as (roll, pitch, yaw) euler angles in degrees.
    pub fn euler_degrees(&self) -> [f64; 3] {
        let (roll, pitch, yaw) = self.orientation.as_unit_quaternion().euler_angles();
        [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()]
    }
}

/// Expresses a world-frame target in the robot base frame.
pub fn make_pose_rel(world: &Pose, target: &Pose) -> Pose {
    Pose::from_isometry(&(world.as_isometry().inverse() * target.as_isometry()))
}

/// Expresses a base-frame pose in the world frame.
pub fn make_pose_abs(world: &Pose, local: &Pose) -> Pose {
    Pose::from_isometry(&(world.as_isometry() * local.as_isometry()))
}

/// Named joint angle in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub value: f64,
}

impl Joint {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}
