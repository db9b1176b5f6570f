//! Vector and block-grid math shared by every component.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// A point or direction in continuous world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction. Zero-length input stays zero.
    pub fn normalized(self) -> Vec3 {
        let n = self.norm();
        if n == 0.0 {
            Vec3::ZERO
        } else {
            self * (1.0 / n)
        }
    }

    pub fn distance_to(self, other: Vec3) -> f64 {
        (other - self).norm()
    }

    /// Horizontal (xz-plane) distance, ignoring y.
    pub fn xz_distance_to(self, other: Vec3) -> f64 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Block containing this point.
    pub fn floored(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// An integer block position on the voxel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn up(self) -> Self {
        self.offset(0, 1, 0)
    }

    /// Center of the block's top face, where a charge placed on this block sits.
    pub fn charge_center(self) -> Vec3 {
        Vec3::new(
            self.x as f64 + 0.5,
            self.y as f64 + 1.0,
            self.z as f64 + 0.5,
        )
    }

    /// Minimum corner of the block as a continuous point.
    pub fn min_corner(self) -> Vec3 {
        Vec3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    pub fn distance_to(self, point: Vec3) -> f64 {
        self.min_corner().distance_to(point)
    }

    pub fn distance_sq_to(self, point: Vec3) -> f64 {
        let d = point - self.min_corner();
        d.dot(d)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Base block key for a charge entity standing at `center`.
///
/// Inverse of [`BlockPos::charge_center`].
pub fn charge_base(center: Vec3) -> BlockPos {
    center.offset(-0.5, -1.0, -0.5).floored()
}

/// The six block faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl Face {
    /// Outward unit normal of the face.
    pub fn normal(self) -> Vec3 {
        match self {
            Face::Down => Vec3::new(0.0, -1.0, 0.0),
            Face::Up => Vec3::new(0.0, 1.0, 0.0),
            Face::North => Vec3::new(0.0, 0.0, -1.0),
            Face::South => Vec3::new(0.0, 0.0, 1.0),
            Face::West => Vec3::new(-1.0, 0.0, 0.0),
            Face::East => Vec3::new(1.0, 0.0, 0.0),
        }
    }
}

/// View direction for a yaw/pitch pair (radians), matching the host's
/// look-vector convention: yaw 0 faces south (+z is negated), pitch positive up.
pub fn view_direction(yaw: f64, pitch: f64) -> Vec3 {
    let cs_pitch = pitch.cos();
    let sn_pitch = pitch.sin();
    let cs_yaw = yaw.cos();
    let sn_yaw = yaw.sin();
    Vec3::new(-sn_yaw * cs_pitch, sn_pitch, -cs_yaw * cs_pitch)
}
