//! Tool Registry & Invoker (spec §4.2, §4.3).

pub mod invoker;
pub mod ledger;
pub mod registry;

pub use invoker::{Envelope, EnvelopeStatus, ToolInvoker};
pub use ledger::canonicalize_and_hash;
pub use registry::{Classification, ToolDescriptor, ToolHandler, ToolRegistry};
