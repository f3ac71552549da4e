use glam::{DMat3, DVec3};

/// A 6D spatial vector combining angular and linear components.
/// In motion space, angular is velocity and linear is the velocity of the
/// body-fixed point at the world origin.
/// In force space, angular is torque about the origin and linear is force.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialVec {
    pub ang: DVec3,
    pub lin: DVec3,
}

impl SpatialVec {
    pub const ZERO: Self = Self {
        ang: DVec3::ZERO,
        lin: DVec3::ZERO,
    };

    pub fn new(ang: DVec3, lin: DVec3) -> Self {
        Self { ang, lin }
    }

    pub fn dot(&self, other: &SpatialVec) -> f64 {
        self.ang.dot(other.ang) + self.lin.dot(other.lin)
    }

    /// Spatial motion cross product: v1 x_m v2
    pub fn cross_motion(&self, other: &SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.ang.cross(other.ang),
            lin: self.ang.cross(other.lin) + self.lin.cross(other.ang),
        }
    }

    /// Spatial force cross product: v x_f f
    pub fn cross_force(&self, other: &SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.ang.cross(other.ang) + self.lin.cross(other.lin),
            lin: self.ang.cross(other.lin),
        }
    }

    /// Linear velocity of the world point `p` under this motion.
    pub fn point_velocity(&self, p: DVec3) -> DVec3 {
        self.lin + self.ang.cross(p)
    }

    pub fn to_array(&self) -> [f64; 6] {
        [
            self.ang.x, self.ang.y, self.ang.z, self.lin.x, self.lin.y, self.lin.z,
        ]
    }
}

impl std::ops::Add for SpatialVec {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            ang: self.ang + other.ang,
            lin: self.lin + other.lin,
        }
    }
}

impl std::ops::AddAssign for SpatialVec {
    fn add_assign(&mut self, other: Self) {
        self.ang += other.ang;
        self.lin += other.lin;
    }
}

impl std::ops::Sub for SpatialVec {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            ang: self.ang - other.ang,
            lin: self.lin - other.lin,
        }
    }
}

impl std::ops::Mul<f64> for SpatialVec {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            ang: self.ang * rhs,
            lin: self.lin * rhs,
        }
    }
}

/// A 6x6 spatial matrix represented as 4 3x3 blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialMat {
    pub m00: DMat3,
    pub m01: DMat3,
    pub m10: DMat3,
    pub m11: DMat3,
}

impl SpatialMat {
    pub fn mul_vec(&self, v: SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.m00 * v.ang + self.m01 * v.lin,
            lin: self.m10 * v.ang + self.m11 * v.lin,
        }
    }
}

/// Cross-product matrix `[v]x` such that `[v]x * u == v.cross(u)`.
pub fn skew(v: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, v.z, -v.y),
        DVec3::new(-v.z, 0.0, v.x),
        DVec3::new(v.y, -v.x, 0.0),
    )
}

/// A spatial inertia tensor: mass, world-frame center of mass, and the
/// world-frame rotational inertia about that center.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialInertia {
    pub mass: f64,
    pub com: DVec3,
    pub inertia: DMat3, // about COM
}

impl SpatialInertia {
    pub const ZERO: Self = Self {
        mass: 0.0,
        com: DVec3::ZERO,
        inertia: DMat3::ZERO,
    };

    pub fn new(mass: f64, com: DVec3, inertia: DMat3) -> Self {
        Self { mass, com, inertia }
    }

    /// Converts this spatial inertia to its 6x6 matrix about the world origin.
    pub fn to_mat(&self) -> SpatialMat {
        let m = self.mass;
        let c_skew = skew(self.com);
        let mc_skew = c_skew * m;

        // I_origin = I_com - m * [c]x [c]x
        let i_origin = self.inertia - c_skew * c_skew * m;

        SpatialMat {
            m00: i_origin,
            m01: mc_skew,
            m10: mc_skew.transpose(),
            m11: DMat3::IDENTITY * m,
        }
    }

    /// Multiplies spatial inertia by spatial motion to get spatial force: f = I * v
    pub fn mul_motion(&self, v: SpatialVec) -> SpatialVec {
        let m = self.mass;
        let c = self.com;

        let ang = self.inertia * v.ang + c.cross(v.lin * m) + c.cross(v.ang.cross(c * m));
        let lin = m * (v.lin - c.cross(v.ang));

        SpatialVec { ang, lin }
    }

    /// Adds two spatial inertias expressed in the same frame.
    pub fn add(&self, other: &Self) -> Self {
        let m_total = self.mass + other.mass;
        if m_total <= 0.0 {
            return Self {
                mass: 0.0,
                com: self.com,
                inertia: self.inertia + other.inertia,
            };
        }

        let com_total = (self.com * self.mass + other.com * other.mass) / m_total;

        // Parallel axis theorem to move both to total COM
        let i1 = self.inertia + inertia_offset(self.com - com_total, self.mass);
        let i2 = other.inertia + inertia_offset(other.com - com_total, other.mass);

        Self {
            mass: m_total,
            com: com_total,
            inertia: i1 + i2,
        }
    }
}

/// Inertia of a point mass `m` at offset `d`: `m * (|d|^2 * 1 - d d')`.
pub fn inertia_offset(d: DVec3, m: f64) -> DMat3 {
    let d2 = d.length_squared();
    (DMat3::from_diagonal(DVec3::splat(d2)) - DMat3::from_cols(d * d.x, d * d.y, d * d.z)) * m
}
