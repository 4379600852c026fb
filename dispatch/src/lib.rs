//! Single-drone order dispatch: a priority-keyed AVL tree of orders and the
//! scheduler that keeps their arrival estimates consistent as orders are
//! created, cancelled, edited and delivered.

pub mod report;
mod runner;
mod scheduler;
mod tree;

pub use runner::ScriptRunner;
pub use scheduler::DispatchScheduler;
pub use tree::{Iter, PriorityTree};
