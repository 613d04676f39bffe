pub mod codec;
pub mod engine;
pub mod messages;
pub mod routing_table;
pub mod scheduler;

pub use codec::*;
pub use engine::*;
pub use messages::*;
pub use routing_table::*;
pub use scheduler::Scheduler;
