//! Switching event delivery on.

use crate::callbacks::{EventKind, Registered};
use crate::env::Instrumentation;
use crate::error::{AgentError, Result};

/// Categories enabled by every bootstrap, whatever capabilities were granted.
///
/// Object allocation has a hook but no switch here: delivery of it is left to
/// whoever owns the profiling session.
pub const PROFILING_EVENTS: [EventKind; 4] = [
    EventKind::ClassFileLoadHook,
    EventKind::NativeMethodBind,
    EventKind::MonitorContendedEnter,
    EventKind::MonitorContendedEntered,
];

/// Enables delivery of `kind` on all threads.
pub fn enable<I: Instrumentation + ?Sized>(env: &I, registered: &Registered, kind: EventKind) -> Result<()> {
    if !registered.table().is_installed(kind) {
        return Err(AgentError::SlotNotInstalled(kind));
    }
    env.set_event_notification_mode(true, kind)
        .map_err(|code| AgentError::NotificationRefused { event: kind, code })?;
    log::debug!("enabled {} notifications", kind);
    Ok(())
}

pub fn enable_profiling_events<I: Instrumentation + ?Sized>(env: &I, registered: &Registered) -> Result<()> {
    for kind in PROFILING_EVENTS {
        enable(env, registered, kind)?;
    }
    Ok(())
}
