//! Agent runtime: turn execution, per-agent service containers, the agent
//! pool, and session-file persistence.

pub mod agent;
pub mod confirm;
pub mod events;
pub mod pool;
pub mod prompt;
pub mod service;
pub mod session;
pub mod turn;

pub use agent::{Agent, AgentSummary, SendError};
pub use confirm::{AllowAll, ConfirmationCallback, DenyAll};
pub use events::{EventSink, NullSink, RecordingSink, TurnEvent};
pub use pool::{AgentPool, CreateAgentConfig, PoolComponents, PoolError};
pub use prompt::PromptLoader;
pub use service::{ClipboardBridge, IdeBridge, ServiceContainer};
pub use session::{SessionError, SessionSnapshot};
pub use turn::{TurnConfig, TurnExecutor, TurnOutcome};
