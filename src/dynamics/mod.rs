//! Simulation dynamics: kinematics, mass matrix, bias forces, constraints,
//! islands and integration.

pub mod constraint;
pub mod crb;
pub mod factor;
pub mod forward;
pub mod integrator;
pub mod island;
pub mod kinematics;
pub(crate) mod parallel;
pub mod passive;
pub mod rne;

pub use constraint::{constraint_velocity, inverse_constraint, make_constraint, solve_global};
pub use crb::composite_rigid_body;
pub use factor::{factor_m, full_m, mul_m, mul_m2, solve_m, solve_m2};
pub use forward::{
    forward, fwd_acceleration, fwd_constraint, fwd_position, fwd_velocity, inverse, step,
};
pub use integrator::{integrate_pos, Integrator};
pub use island::{discover_islands, solve_islands, Island};
pub use kinematics::{com_vel, jac_point, kinematics};
pub use passive::passive;
pub use rne::rne;
