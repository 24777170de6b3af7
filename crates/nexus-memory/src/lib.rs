pub mod history;
pub mod lock;
pub mod memory;
pub mod redis;
pub mod workflow_state;

pub use history::AgentHistoryStore;
pub use lock::{WorkflowGuard, WorkflowLocks};
pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use workflow_state::WorkflowStateStore;
