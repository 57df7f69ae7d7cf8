use thiserror::Error;

use crate::callbacks::EventKind;
use crate::options::OptionsError;
use crate::sys::jni;
use crate::sys::jvmti::jvmtiError;

/// Failures that stop the bootstrap sequence.
///
/// A capability the host refuses is not one of these: negotiation reports it
/// and the agent keeps going with whatever it was granted.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("unable to obtain a JVMTI environment (GetEnv returned {0})")]
    EnvUnavailable(jni::jint),

    #[error("failed to register event callbacks: {0}")]
    CallbackRegistration(jvmtiError),

    #[error("failed to enable {event} notifications: {code}")]
    NotificationRefused { event: EventKind, code: jvmtiError },

    #[error("cannot enable {0}: no callback installed for it")]
    SlotNotInstalled(EventKind),

    #[error("malformed agent options: >{0}<")]
    Usage(String),

    #[error("invalid agent options: {0}")]
    Options(#[from] OptionsError),
}

impl AgentError {
    /// Environment inconsistencies, as opposed to bad user input.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AgentError::Usage(_) | AgentError::Options(_))
    }

    /// The status handed back to the VM from an entry point.
    pub fn status(&self) -> jni::jint {
        match self {
            AgentError::EnvUnavailable(code) if *code < 0 => *code,
            _ => jni::JNI_ERR,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
