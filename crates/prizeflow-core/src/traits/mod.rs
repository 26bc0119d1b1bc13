pub mod counter;
pub mod queue;
pub mod sink;

pub use counter::{CounterStore, CounterTxn};
pub use queue::GrantQueue;
pub use sink::RecordSink;
