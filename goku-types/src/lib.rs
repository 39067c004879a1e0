#![forbid(unsafe_code)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod event;
mod kv;
mod lease;
mod options;

pub use event::{Event, EventType, InvalidEventType};
pub use kv::{KV, MAX_KEY_SIZE, MAX_VALUE_SIZE};
pub use lease::Lease;
pub use options::SetOptions;
