mod error;
mod hook;
mod invoker;
mod process;
mod registry;
mod router;
mod rpc;
mod session;
mod sse;
#[cfg(test)]
pub(crate) mod testing;

pub use error::{FailureClass, InvokeError, ToolInvokeError};
pub use hook::{BUILTIN_HOOKS, HookOutput, ResultHook, builtin as builtin_hook};
pub use invoker::{RetryPolicy, ToolInvoker};
pub use process::PipeSession;
pub use registry::{SessionRegistry, SessionSlot};
pub use router::{ToolCallRouter, parse_arguments};
pub use rpc::ToolCallOutcome;
pub use session::{SessionState, ToolCatalogue, ToolSession, connect};
pub use sse::StreamSession;
