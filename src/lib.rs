//! Nuclear Plant Operator Training Simulator Library
//!
//! Fixed-step physics of a simplified pressurised water plant, scripted
//! feedwater fault scenarios, and a step engine that walks the trainee
//! through an emergency operating procedure stored as a graph.

pub mod config;
pub mod driver;
pub mod error;
pub mod loader;
pub mod noise;
pub mod physics;
pub mod plant;
pub mod procedure;
pub mod scenario;
pub mod session;
pub mod simulator;
pub mod trajectory;
pub mod transition;

pub use config::SimConfig;
pub use error::LoadError;
pub use plant::{AlarmSet, Command, PlantState, ProcessVariables, Valve};
pub use procedure::{NodeId, ProcedureGraph, RuleBook, StepAction, StepChoice, StepKind, StepOptions};
pub use scenario::Scenario;
pub use simulator::{Simulator, SimulatorSnapshot};
pub use trajectory::Trajectory;
