//! Mathematical types for node transforms.
//!
//! Matrices are column-major, matching the scene document's `matrix` arrays.

use bytemuck::{Pod, Zeroable};

/// 3D Vector - translation, scale
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// All ones
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Quaternion {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Converts to `[x, y, z, w]`
    #[must_use]
    pub const fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Creates from `[x, y, z, w]`
    #[must_use]
    pub const fn from_array(arr: [f32; 4]) -> Self {
        Self::new(arr[0], arr[1], arr[2], arr[3])
    }

    /// Unit-length copy; identity for a zero quaternion.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Rotation from an orthonormal, column-major 3x3 matrix.
    #[must_use]
    pub fn from_rotation(c: [[f32; 3]; 3]) -> Self {
        // c[col][row]
        let (m00, m11, m22) = (c[0][0], c[1][1], c[2][2]);
        let trace = m00 + m11 + m22;
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new((c[1][2] - c[2][1]) / s, (c[2][0] - c[0][2]) / s, (c[0][1] - c[1][0]) / s, 0.25 * s)
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Self::new(0.25 * s, (c[1][0] + c[0][1]) / s, (c[2][0] + c[0][2]) / s, (c[1][2] - c[2][1]) / s)
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Self::new((c[1][0] + c[0][1]) / s, 0.25 * s, (c[2][1] + c[1][2]) / s, (c[2][0] - c[0][2]) / s)
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Self::new((c[2][0] + c[0][2]) / s, (c[2][1] + c[1][2]) / s, 0.25 * s, (c[0][1] - c[1][0]) / s)
        };
        q.normalized()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Column-major 4x4 matrix
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Mat4 {
    /// Elements, column by column
    pub cols: [f32; 16],
}

impl Mat4 {
    /// Identity matrix
    pub const IDENTITY: Self = Self {
        cols: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    /// Builds `T * R * S`.
    #[must_use]
    pub fn from_trs(translation: Vec3, rotation: Quaternion, scale: Vec3) -> Self {
        let Quaternion { x, y, z, w } = rotation.normalized();
        let (xx, yy, zz) = (x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);

        Self {
            cols: [
                (1.0 - 2.0 * (yy + zz)) * scale.x,
                2.0 * (xy + wz) * scale.x,
                2.0 * (xz - wy) * scale.x,
                0.0,
                2.0 * (xy - wz) * scale.y,
                (1.0 - 2.0 * (xx + zz)) * scale.y,
                2.0 * (yz + wx) * scale.y,
                0.0,
                2.0 * (xz + wy) * scale.z,
                2.0 * (yz - wx) * scale.z,
                (1.0 - 2.0 * (xx + yy)) * scale.z,
                0.0,
                translation.x,
                translation.y,
                translation.z,
                1.0,
            ],
        }
    }

    /// Splits an affine matrix into translation, rotation and scale.
    ///
    /// A negative determinant is folded into the X scale.
    #[must_use]
    pub fn to_trs(&self) -> (Vec3, Quaternion, Vec3) {
        let m = &self.cols;
        let translation = Vec3::new(m[12], m[13], m[14]);
        let axes = [
            Vec3::new(m[0], m[1], m[2]),
            Vec3::new(m[4], m[5], m[6]),
            Vec3::new(m[8], m[9], m[10]),
        ];
        let mut scale = Vec3::new(axes[0].length(), axes[1].length(), axes[2].length());
        if self.determinant3() < 0.0 {
            scale.x = -scale.x;
        }

        let unit = |axis: Vec3, s: f32| if s.abs() <= f32::EPSILON { Vec3::ZERO } else { axis * (1.0 / s) };
        let (a, b, c) = (unit(axes[0], scale.x), unit(axes[1], scale.y), unit(axes[2], scale.z));
        let rotation = Quaternion::from_rotation([a.to_array(), b.to_array(), c.to_array()]);
        (translation, rotation, scale)
    }

    fn determinant3(&self) -> f32 {
        let m = &self.cols;
        m[0] * (m[5] * m[10] - m[9] * m[6]) - m[4] * (m[1] * m[10] - m[9] * m[2])
            + m[8] * (m[1] * m[6] - m[5] * m[2])
    }

    /// Returns whether every element is within `epsilon` of `other`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.cols.iter().zip(&other.cols).all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_trs() {
        let m = Mat4::from_trs(Vec3::ZERO, Quaternion::IDENTITY, Vec3::ONE);
        assert_eq!(m, Mat4::IDENTITY);
        let (t, r, s) = m.to_trs();
        assert_eq!(t, Vec3::ZERO);
        assert_eq!(r, Quaternion::IDENTITY);
        assert_eq!(s, Vec3::ONE);
    }

    #[test]
    fn test_compose_decompose() {
        // 90 degrees about Y
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let rotation = Quaternion::new(0.0, half, 0.0, half);
        let m = Mat4::from_trs(Vec3::new(1.0, 2.0, 3.0), rotation, Vec3::new(2.0, 2.0, 2.0));

        let (t, r, s) = m.to_trs();
        assert_eq!(t, Vec3::new(1.0, 2.0, 3.0));
        assert!((s.x - 2.0).abs() < 1e-5 && (s.y - 2.0).abs() < 1e-5 && (s.z - 2.0).abs() < 1e-5);
        assert!((r.y - half).abs() < 1e-5);
        assert!((r.w - half).abs() < 1e-5);

        let again = Mat4::from_trs(t, r, s);
        assert!(again.approx_eq(&m, 1e-5));
    }

    #[test]
    fn test_translation_lands_in_last_column() {
        let m = Mat4::from_trs(Vec3::new(5.0, 6.0, 7.0), Quaternion::IDENTITY, Vec3::ONE);
        assert_eq!(&m.cols[12..15], &[5.0, 6.0, 7.0]);
    }
}
