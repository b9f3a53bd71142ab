//! Capture flow: the transition table, its concurrency primitives and the
//! tokio driver that connects it to device collaborators.

pub mod runner;
pub mod single_flight;
pub mod state;
pub mod timer;

pub use runner::{EventStream, FlowHandle, FlowRunner};
pub use single_flight::{FlightGuard, SingleFlight};
pub use state::{
    Command, DeviceWarning, FlowEvent, FlowInput, FlowMachine, FlowResult, FlowStats, Guidance,
    Phase,
};
pub use timer::{TimerGeneration, TimerHandle};
