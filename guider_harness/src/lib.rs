//! Guider harness for testing and simulation
//!
//! A simulated mount implementing [`guider::PulseActuator`], synthetic star
//! fields standing in for the star detector, and a session runner tying them
//! to a [`guider::GuidanceController`].

pub mod session;
pub mod sim_mount;
pub mod star_field;

pub use session::{FrameReport, GuideSession, SessionConfig};
pub use sim_mount::{MountModel, SimulatedMount};
pub use star_field::StarField;
