//! Reassembly primitive shared by the receiver and application readers.

mod subscribable;

pub use subscribable::{StreamReader, SubscribableStream};
