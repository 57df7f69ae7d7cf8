//! Capability negotiation.
//!
//! The agent asks for one fixed superset of capabilities in a single
//! `AddCapabilities` call. JVMTI grants all of them or none, so a refusal is
//! diagnosed (via `GetPotentialCapabilities`) and reported, never retried and
//! never treated as fatal: the events that depend on a missing capability
//! simply do not arrive.

use std::fmt;

use crate::env::Instrumentation;
use crate::sys::jni::jint;
use crate::sys::jvmti::{self, jvmtiCapabilities, jvmtiError};

/// The capabilities a profiling session asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    RedefineClasses,
    RetransformClasses,
    GarbageCollectionEvents,
    NativeMethodBindEvents,
    MonitorEvents,
    CurrentThreadCpuTime,
    VmObjectAllocEvents,
    MonitorInfo,
}

/// Every capability the agent requests, in request order.
pub const PROFILING: [Capability; 8] = [
    Capability::RedefineClasses,
    Capability::RetransformClasses,
    Capability::GarbageCollectionEvents,
    Capability::NativeMethodBindEvents,
    Capability::MonitorEvents,
    Capability::CurrentThreadCpuTime,
    Capability::VmObjectAllocEvents,
    Capability::MonitorInfo,
];

impl Capability {
    /// Oldest interface version that defines this capability.
    pub fn min_version(self) -> jint {
        match self {
            Capability::RetransformClasses => jvmti::JVMTI_VERSION_1_1,
            _ => jvmti::JVMTI_VERSION_1_0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Capability::RedefineClasses => "can_redefine_classes",
            Capability::RetransformClasses => "can_retransform_classes",
            Capability::GarbageCollectionEvents => "can_generate_garbage_collection_events",
            Capability::NativeMethodBindEvents => "can_generate_native_method_bind_events",
            Capability::MonitorEvents => "can_generate_monitor_events",
            Capability::CurrentThreadCpuTime => "can_get_current_thread_cpu_time",
            Capability::VmObjectAllocEvents => "can_generate_vm_object_alloc_events",
            Capability::MonitorInfo => "can_get_monitor_info",
        }
    }

    pub fn add_to(self, caps: &mut jvmtiCapabilities) {
        match self {
            Capability::RedefineClasses => caps.set_can_redefine_classes(true),
            Capability::RetransformClasses => caps.set_can_retransform_classes(true),
            Capability::GarbageCollectionEvents => caps.set_can_generate_garbage_collection_events(true),
            Capability::NativeMethodBindEvents => caps.set_can_generate_native_method_bind_events(true),
            Capability::MonitorEvents => caps.set_can_generate_monitor_events(true),
            Capability::CurrentThreadCpuTime => caps.set_can_get_current_thread_cpu_time(true),
            Capability::VmObjectAllocEvents => caps.set_can_generate_vm_object_alloc_events(true),
            Capability::MonitorInfo => caps.set_can_get_monitor_info(true),
        }
    }

    pub fn is_set(self, caps: &jvmtiCapabilities) -> bool {
        match self {
            Capability::RedefineClasses => caps.can_redefine_classes(),
            Capability::RetransformClasses => caps.can_retransform_classes(),
            Capability::GarbageCollectionEvents => caps.can_generate_garbage_collection_events(),
            Capability::NativeMethodBindEvents => caps.can_generate_native_method_bind_events(),
            Capability::MonitorEvents => caps.can_generate_monitor_events(),
            Capability::CurrentThreadCpuTime => caps.can_get_current_thread_cpu_time(),
            Capability::VmObjectAllocEvents => caps.can_generate_vm_object_alloc_events(),
            Capability::MonitorInfo => caps.can_get_monitor_info(),
        }
    }

    /// The profiling capabilities that exist at interface `version`.
    pub fn required_for(version: jint) -> Vec<Capability> {
        PROFILING
            .iter()
            .copied()
            .filter(|cap| version >= cap.min_version())
            .collect()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What came out of a negotiation round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiation {
    /// Interface version the request was built for.
    pub version: jint,
    pub requested: Vec<Capability>,
    /// The raw `AddCapabilities` result.
    pub outcome: Result<(), jvmtiError>,
    /// Requested capabilities the host reported it cannot provide. Only
    /// populated after a refusal.
    pub missing: Vec<Capability>,
}

impl Negotiation {
    pub fn is_complete(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Requests the profiling capability set from `env`.
pub fn negotiate<I: Instrumentation + ?Sized>(env: &I) -> Negotiation {
    let version = env.version_number().unwrap_or_else(|err| {
        log::warn!("GetVersionNumber failed ({}), assuming JVMTI 1.0", err);
        jvmti::JVMTI_VERSION_1_0
    });

    let mut caps = env.capabilities().unwrap_or_else(|err| {
        log::warn!("GetCapabilities failed ({}), starting from an empty set", err);
        jvmtiCapabilities::default()
    });

    let requested = Capability::required_for(version);
    for cap in &requested {
        cap.add_to(&mut caps);
    }
    log::debug!(
        "requesting {} capabilities for JVMTI version {:#x}",
        requested.len(),
        version
    );

    let outcome = env.add_capabilities(&caps);
    let missing = match outcome {
        Ok(()) => Vec::new(),
        Err(_) => diagnose(env, &requested),
    };

    Negotiation {
        version,
        requested,
        outcome,
        missing,
    }
}

fn diagnose<I: Instrumentation + ?Sized>(env: &I, requested: &[Capability]) -> Vec<Capability> {
    let potential = match env.potential_capabilities() {
        Ok(potential) => potential,
        Err(err) => {
            log::warn!("GetPotentialCapabilities failed ({}), cannot tell which capability was refused", err);
            return Vec::new();
        }
    };

    let missing: Vec<Capability> = requested
        .iter()
        .copied()
        .filter(|cap| !cap.is_set(&potential))
        .collect();
    for cap in &missing {
        log::warn!("capability {} is not available in this VM", cap);
    }
    missing
}
