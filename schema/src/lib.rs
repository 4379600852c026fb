mod command;
mod entities;
mod error;
mod priority;
mod runner;
mod scheduler;

pub use command::Command;
pub use entities::{Order, OrderId, Time};
pub use error::{DispatchError, ScriptError};
pub use priority::{PriorityWeights, PROCESS_WEIGHTS};
pub use runner::Runner;
pub use scheduler::{by_arrival, Cancellation, Creation, Dispatcher, FlightTimeUpdate};

pub const SAMPLE_SCENARIO_PATH: &'static str = "./test_data/scenario_one.txt";
