//! The seam between the bootstrap and the host VM.
//!
//! Bootstrap code never touches raw JVMTI pointers. It talks to a
//! [`HostVm`], which hands out an [`Instrumentation`] environment, and every
//! call it makes goes through that trait. [`JavaVm`] and [`Jvmti`] are the
//! production implementations over the pointers the VM passes to the exported
//! entry points; tests substitute recording fakes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use profiler_agent::env::{HostVm, Instrumentation, JavaVm};
//! use profiler_agent::callbacks::EventKind;
//!
//! let vm = unsafe { JavaVm::from_raw(raw_vm) };
//! let jvmti = vm.acquire_instrumentation()?;
//!
//! let version = jvmti.version_number()?;
//! jvmti.set_event_notification_mode(true, EventKind::ClassFileLoadHook)?;
//! ```

use crate::callbacks::{CallbackTable, EventKind};
use crate::error::AgentError;
use crate::sys::jni::{jint, jlong};
use crate::sys::jvmti::{jvmtiCapabilities, jvmtiError};

pub use crate::jvmti_wrapper::{JavaVm, Jvmti};

/// The subset of JVMTI the agent drives.
///
/// Implementations are shared with every VM thread that delivers an event, so
/// they must be `Send + Sync`.
pub trait Instrumentation: Send + Sync {
    /// `GetVersionNumber`.
    fn version_number(&self) -> Result<jint, jvmtiError>;

    /// `GetCapabilities`: what this environment already possesses.
    fn capabilities(&self) -> Result<jvmtiCapabilities, jvmtiError>;

    /// `GetPotentialCapabilities`: what it could be granted right now.
    fn potential_capabilities(&self) -> Result<jvmtiCapabilities, jvmtiError>;

    /// `AddCapabilities`. All or nothing.
    fn add_capabilities(&self, caps: &jvmtiCapabilities) -> Result<(), jvmtiError>;

    /// `SetEventCallbacks`. Replaces the whole table.
    fn set_event_callbacks(&self, table: &CallbackTable) -> Result<(), jvmtiError>;

    /// `SetEventNotificationMode` for all threads.
    fn set_event_notification_mode(&self, enable: bool, event: EventKind) -> Result<(), jvmtiError>;

    /// `GetTime`, in nanoseconds.
    fn time(&self) -> Result<jlong, jvmtiError>;
}

/// Something that can hand out an instrumentation environment.
pub trait HostVm {
    type Env: Instrumentation;

    fn acquire_instrumentation(&self) -> Result<Self::Env, AgentError>;
}
