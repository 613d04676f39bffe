pub mod config;
pub mod error;
pub mod protocol;

pub use config::{RouterConfig, RouterSettings};
pub use error::{ConfigError, DecodeError, HandshakeError, TableError, TransportError};
pub use protocol::{
    EngineState, ForwardingEntry, ForwardingTable, RouterEngine, RunReport, Termination,
};
