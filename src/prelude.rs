//! Common imports for writing an agent on top of this crate.

pub use crate::bootstrap::{AgentContext, Stage, Startup};
pub use crate::callbacks::{CallbackTable, EventKind};
pub use crate::env::{HostVm, Instrumentation, JavaVm, Jvmti};
pub use crate::error::AgentError;
pub use crate::export_agent;
pub use crate::options::AgentOptions;
pub use crate::sys::{jni, jvmti};
pub use crate::{nano_time, EventHooks};
