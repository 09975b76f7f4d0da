// ABOUTME: Validated domain types shared by the runtime client.
// ABOUTME: Container ids, memory limits, and wait conditions.

mod condition;
mod id;
mod memory;

pub use condition::{ParseConditionError, WaitCondition};
pub use id::ContainerId;
pub use memory::{MemoryLimit, ParseMemoryError};
