//! The event-callback table.
//!
//! A [`CallbackTable`] records which hook slots are installed. It is handed to
//! the host in one piece; slots that are not installed are rendered as null so
//! the host never calls them. Only [`register`] produces a [`Registered`]
//! token, and enabling notifications requires one, so a notification can never
//! be switched on before its callback exists.

use std::fmt;

use crate::env::Instrumentation;
use crate::error::{AgentError, Result};
use crate::sys::jvmti::{self, jvmtiEvent, jvmtiEventCallbacks};

/// The events the agent hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The deferred runtime-ready hook.
    VmInit = 0,
    ClassFileLoadHook = 1,
    NativeMethodBind = 2,
    MonitorContendedEnter = 3,
    MonitorContendedEntered = 4,
    VmObjectAlloc = 5,
}

impl EventKind {
    pub const COUNT: usize = 6;

    pub const ALL: [EventKind; EventKind::COUNT] = [
        EventKind::VmInit,
        EventKind::ClassFileLoadHook,
        EventKind::NativeMethodBind,
        EventKind::MonitorContendedEnter,
        EventKind::MonitorContendedEntered,
        EventKind::VmObjectAlloc,
    ];

    /// The JVMTI event number.
    pub fn event_type(self) -> jvmtiEvent {
        match self {
            EventKind::VmInit => jvmti::JVMTI_EVENT_VM_INIT,
            EventKind::ClassFileLoadHook => jvmti::JVMTI_EVENT_CLASS_FILE_LOAD_HOOK,
            EventKind::NativeMethodBind => jvmti::JVMTI_EVENT_NATIVE_METHOD_BIND,
            EventKind::MonitorContendedEnter => jvmti::JVMTI_EVENT_MONITOR_CONTENDED_ENTER,
            EventKind::MonitorContendedEntered => jvmti::JVMTI_EVENT_MONITOR_CONTENDED_ENTERED,
            EventKind::VmObjectAlloc => jvmti::JVMTI_EVENT_VM_OBJECT_ALLOC,
        }
    }

    pub fn from_event_type(event: jvmtiEvent) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|kind| kind.event_type() == event)
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::VmInit => "VMInit",
            EventKind::ClassFileLoadHook => "ClassFileLoadHook",
            EventKind::NativeMethodBind => "NativeMethodBind",
            EventKind::MonitorContendedEnter => "MonitorContendedEnter",
            EventKind::MonitorContendedEntered => "MonitorContendedEntered",
            EventKind::VmObjectAlloc => "VMObjectAlloc",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which hook slots are installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallbackTable {
    slots: [bool; EventKind::COUNT],
}

impl CallbackTable {
    /// No slot installed.
    pub fn empty() -> Self {
        CallbackTable::default()
    }

    /// The five profiling hooks. The runtime-ready slot stays empty.
    pub fn profiling() -> Self {
        CallbackTable::empty()
            .with(EventKind::ClassFileLoadHook)
            .with(EventKind::NativeMethodBind)
            .with(EventKind::MonitorContendedEnter)
            .with(EventKind::MonitorContendedEntered)
            .with(EventKind::VmObjectAlloc)
    }

    #[must_use]
    pub fn with(mut self, kind: EventKind) -> Self {
        self.slots[kind.index()] = true;
        self
    }

    pub fn is_installed(&self, kind: EventKind) -> bool {
        self.slots[kind.index()]
    }

    /// One bit per slot, in `EventKind` order.
    pub fn bits(&self) -> u8 {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.is_installed(*kind))
            .fold(0, |bits, kind| bits | 1 << kind.index())
    }

    pub fn from_bits(bits: u8) -> Self {
        EventKind::ALL
            .into_iter()
            .filter(|kind| bits & (1 << kind.index()) != 0)
            .fold(CallbackTable::empty(), CallbackTable::with)
    }

    pub fn installed(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.is_installed(*kind))
            .collect()
    }

    /// Renders the table in the layout the host expects, wiring each
    /// installed slot to the dispatching trampoline.
    pub fn to_raw(&self) -> jvmtiEventCallbacks {
        let mut callbacks = jvmtiEventCallbacks::default();

        if self.is_installed(EventKind::VmInit) {
            callbacks.VMInit = Some(crate::trampoline_vm_init);
        }
        if self.is_installed(EventKind::ClassFileLoadHook) {
            callbacks.ClassFileLoadHook = Some(crate::trampoline_class_file_load_hook);
        }
        if self.is_installed(EventKind::NativeMethodBind) {
            callbacks.NativeMethodBind = Some(crate::trampoline_native_method_bind);
        }
        if self.is_installed(EventKind::MonitorContendedEnter) {
            callbacks.MonitorContendedEnter = Some(crate::trampoline_monitor_contended_enter);
        }
        if self.is_installed(EventKind::MonitorContendedEntered) {
            callbacks.MonitorContendedEntered = Some(crate::trampoline_monitor_contended_entered);
        }
        if self.is_installed(EventKind::VmObjectAlloc) {
            callbacks.VMObjectAlloc = Some(crate::trampoline_vm_object_alloc);
        }

        callbacks
    }
}

/// Proof that a table has been accepted by the host.
#[derive(Debug)]
pub struct Registered {
    table: CallbackTable,
}

impl Registered {
    pub fn table(&self) -> &CallbackTable {
        &self.table
    }
}

/// Hands `table` to the host. A refusal is fatal.
pub fn register<I: Instrumentation + ?Sized>(env: &I, table: CallbackTable) -> Result<Registered> {
    env.set_event_callbacks(&table)
        .map_err(AgentError::CallbackRegistration)?;
    log::debug!("registered callbacks for {:?}", table.installed());
    Ok(Registered { table })
}
