//! Station model: state, wall-clock synchronization, and lifecycle.

pub mod clock;
pub mod manager;
pub mod state;

pub use clock::{sync_position, RotationEntry};
pub use manager::StationManager;
pub use state::{BufferedChunk, InFlight, ParameterSets, Station, StationState};
