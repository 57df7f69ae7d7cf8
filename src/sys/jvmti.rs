// profiler-agent/src/sys/jvmti.rs
//
// JVMTI (JVM Tool Interface) bindings for the profiler bootstrap.
//
// Only the entries the agent calls are typed. The function table and the
// event-callback struct still reproduce the full C layout, because the VM
// indexes into them by offset: untyped function slots are kept as opaque
// pointers and unused event slots as untyped callbacks.
//
// Layout follows jvmti.h (JDK 8 through 21). Newer JDKs only append.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::fmt;
use std::os::raw::{c_char, c_uchar, c_void};
use std::ptr;

use crate::sys::jni::{jclass, jint, jlong, jmethodID, jobject, jthread, JNIEnv};

// --- Versions ---
pub const JVMTI_VERSION_1_0: jint = 0x30010000;
pub const JVMTI_VERSION_1_1: jint = 0x30010100;
pub const JVMTI_VERSION_1_2: jint = 0x30010200;

// --- Events ---
pub type jvmtiEvent = jint;

pub const JVMTI_EVENT_VM_INIT: jvmtiEvent = 50;
pub const JVMTI_EVENT_VM_DEATH: jvmtiEvent = 51;
pub const JVMTI_EVENT_CLASS_FILE_LOAD_HOOK: jvmtiEvent = 54;
pub const JVMTI_EVENT_NATIVE_METHOD_BIND: jvmtiEvent = 67;
pub const JVMTI_EVENT_MONITOR_CONTENDED_ENTER: jvmtiEvent = 75;
pub const JVMTI_EVENT_MONITOR_CONTENDED_ENTERED: jvmtiEvent = 76;
pub const JVMTI_EVENT_GARBAGE_COLLECTION_START: jvmtiEvent = 81;
pub const JVMTI_EVENT_GARBAGE_COLLECTION_FINISH: jvmtiEvent = 82;
pub const JVMTI_EVENT_VM_OBJECT_ALLOC: jvmtiEvent = 84;

pub type jvmtiEventMode = jint;

pub const JVMTI_ENABLE: jvmtiEventMode = 1;
pub const JVMTI_DISABLE: jvmtiEventMode = 0;

// --- Error Codes ---

/// A JVMTI error code as returned by the VM.
///
/// Kept as a transparent integer rather than an enum: the VM may hand back
/// codes this crate does not name, and those still have to be reported.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct jvmtiError(pub u32);

impl jvmtiError {
    pub const NONE: jvmtiError = jvmtiError(0);
    pub const INVALID_THREAD: jvmtiError = jvmtiError(10);
    pub const NOT_AVAILABLE: jvmtiError = jvmtiError(98);
    pub const MUST_POSSESS_CAPABILITY: jvmtiError = jvmtiError(99);
    pub const NULL_POINTER: jvmtiError = jvmtiError(100);
    pub const INVALID_EVENT_TYPE: jvmtiError = jvmtiError(102);
    pub const ILLEGAL_ARGUMENT: jvmtiError = jvmtiError(103);
    pub const OUT_OF_MEMORY: jvmtiError = jvmtiError(110);
    pub const ACCESS_DENIED: jvmtiError = jvmtiError(111);
    pub const WRONG_PHASE: jvmtiError = jvmtiError(112);
    pub const INTERNAL: jvmtiError = jvmtiError(113);
    pub const UNATTACHED_THREAD: jvmtiError = jvmtiError(115);
    pub const INVALID_ENVIRONMENT: jvmtiError = jvmtiError(116);

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::NONE => "JVMTI_ERROR_NONE",
            Self::INVALID_THREAD => "JVMTI_ERROR_INVALID_THREAD",
            Self::NOT_AVAILABLE => "JVMTI_ERROR_NOT_AVAILABLE",
            Self::MUST_POSSESS_CAPABILITY => "JVMTI_ERROR_MUST_POSSESS_CAPABILITY",
            Self::NULL_POINTER => "JVMTI_ERROR_NULL_POINTER",
            Self::INVALID_EVENT_TYPE => "JVMTI_ERROR_INVALID_EVENT_TYPE",
            Self::ILLEGAL_ARGUMENT => "JVMTI_ERROR_ILLEGAL_ARGUMENT",
            Self::OUT_OF_MEMORY => "JVMTI_ERROR_OUT_OF_MEMORY",
            Self::ACCESS_DENIED => "JVMTI_ERROR_ACCESS_DENIED",
            Self::WRONG_PHASE => "JVMTI_ERROR_WRONG_PHASE",
            Self::INTERNAL => "JVMTI_ERROR_INTERNAL",
            Self::UNATTACHED_THREAD => "JVMTI_ERROR_UNATTACHED_THREAD",
            Self::INVALID_ENVIRONMENT => "JVMTI_ERROR_INVALID_ENVIRONMENT",
            _ => return None,
        };
        Some(name)
    }

    /// `Ok(())` for `JVMTI_ERROR_NONE`, the code itself otherwise.
    pub fn into_result(self) -> Result<(), jvmtiError> {
        if self == Self::NONE {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Debug for jvmtiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for jvmtiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "JVMTI error {}", self.0),
        }
    }
}

// --- Capabilities ---
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct jvmtiCapabilities {
    bits: [u32; 4],
}

impl jvmtiCapabilities {
    fn set_bit(&mut self, bit_offset: usize, value: bool) {
        let word_index = bit_offset / 32;
        let bit_index = bit_offset % 32;
        if value {
            self.bits[word_index] |= 1 << bit_index;
        } else {
            self.bits[word_index] &= !(1 << bit_index);
        }
    }

    fn get_bit(&self, bit_offset: usize) -> bool {
        let word_index = bit_offset / 32;
        let bit_index = bit_offset % 32;
        (self.bits[word_index] & (1 << bit_index)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|word| *word == 0)
    }

    // Bit offsets follow the declaration order of the C bitfield.

    // [7]
    pub fn set_can_get_monitor_info(&mut self, v: bool) { self.set_bit(7, v); }
    pub fn can_get_monitor_info(&self) -> bool { self.get_bit(7) }

    // [9]
    pub fn set_can_redefine_classes(&mut self, v: bool) { self.set_bit(9, v); }
    pub fn can_redefine_classes(&self) -> bool { self.get_bit(9) }

    // [22]
    pub fn set_can_get_current_thread_cpu_time(&mut self, v: bool) { self.set_bit(22, v); }
    pub fn can_get_current_thread_cpu_time(&self) -> bool { self.get_bit(22) }

    // [28]
    pub fn set_can_generate_monitor_events(&mut self, v: bool) { self.set_bit(28, v); }
    pub fn can_generate_monitor_events(&self) -> bool { self.get_bit(28) }

    // [29]
    pub fn set_can_generate_vm_object_alloc_events(&mut self, v: bool) { self.set_bit(29, v); }
    pub fn can_generate_vm_object_alloc_events(&self) -> bool { self.get_bit(29) }

    // [30]
    pub fn set_can_generate_native_method_bind_events(&mut self, v: bool) { self.set_bit(30, v); }
    pub fn can_generate_native_method_bind_events(&self) -> bool { self.get_bit(30) }

    // [31]
    pub fn set_can_generate_garbage_collection_events(&mut self, v: bool) { self.set_bit(31, v); }
    pub fn can_generate_garbage_collection_events(&self) -> bool { self.get_bit(31) }

    // [37] (JVMTI 1.1+)
    pub fn set_can_retransform_classes(&mut self, v: bool) { self.set_bit(37, v); }
    pub fn can_retransform_classes(&self) -> bool { self.get_bit(37) }
}

// =========================================================================
// FUNCTION TYPEDEFS: JVMTI FUNCTIONS
// =========================================================================

pub type JvmtiSetEventNotificationModeFn = unsafe extern "system" fn(env: *mut jvmtiEnv, mode: jvmtiEventMode, event_type: jvmtiEvent, event_thread: jthread) -> jvmtiError;
pub type JvmtiGetVersionNumberFn = unsafe extern "system" fn(env: *mut jvmtiEnv, version_ptr: *mut jint) -> jvmtiError;
pub type JvmtiGetCapabilitiesFn = unsafe extern "system" fn(env: *mut jvmtiEnv, capabilities_ptr: *mut jvmtiCapabilities) -> jvmtiError;
pub type JvmtiSetEventCallbacksFn = unsafe extern "system" fn(env: *mut jvmtiEnv, callbacks: *const jvmtiEventCallbacks, size_of_callbacks: jint) -> jvmtiError;
pub type JvmtiGetTimeFn = unsafe extern "system" fn(env: *mut jvmtiEnv, nanos_ptr: *mut jlong) -> jvmtiError;
pub type JvmtiGetPotentialCapabilitiesFn = unsafe extern "system" fn(env: *mut jvmtiEnv, capabilities_ptr: *mut jvmtiCapabilities) -> jvmtiError;
pub type JvmtiAddCapabilitiesFn = unsafe extern "system" fn(env: *mut jvmtiEnv, capabilities_ptr: *const jvmtiCapabilities) -> jvmtiError;

/// An entry of the function table this crate never calls.
pub type JvmtiOpaqueFn = *const c_void;

#[repr(C)]
#[derive(Copy, Clone)]
pub struct jvmtiInterface_1_ {
    /*   1:  RESERVED */
    pub reserved1: JvmtiOpaqueFn,
    /*   2: Set Event Notification Mode */
    pub SetEventNotificationMode: Option<JvmtiSetEventNotificationModeFn>,
    /*   3-87: threads, frames, monitors, classes, methods, redefinition */
    pub functions3_87: [JvmtiOpaqueFn; 85],
    /*   88: Get Version Number */
    pub GetVersionNumber: Option<JvmtiGetVersionNumberFn>,
    /*   89: Get Capabilities */
    pub GetCapabilities: Option<JvmtiGetCapabilitiesFn>,
    /*   90-121: modules, stack traces, heap, JNI function table */
    pub functions90_121: [JvmtiOpaqueFn; 32],
    /*   122: Set Event Callbacks */
    pub SetEventCallbacks: Option<JvmtiSetEventCallbacksFn>,
    /*   123-138: extensions, properties, phase, timers */
    pub functions123_138: [JvmtiOpaqueFn; 16],
    /*   139: Get Time */
    pub GetTime: Option<JvmtiGetTimeFn>,
    /*   140: Get Potential Capabilities */
    pub GetPotentialCapabilities: Option<JvmtiGetPotentialCapabilitiesFn>,
    /*   141:  RESERVED */
    pub reserved141: JvmtiOpaqueFn,
    /*   142: Add Capabilities */
    pub AddCapabilities: Option<JvmtiAddCapabilitiesFn>,
    /*   143-156: relinquish, class search, retransform, sampling */
    pub functions143_156: [JvmtiOpaqueFn; 14],
}

impl Default for jvmtiInterface_1_ {
    fn default() -> Self {
        Self {
            reserved1: ptr::null(),
            SetEventNotificationMode: None,
            functions3_87: [ptr::null(); 85],
            GetVersionNumber: None,
            GetCapabilities: None,
            functions90_121: [ptr::null(); 32],
            SetEventCallbacks: None,
            functions123_138: [ptr::null(); 16],
            GetTime: None,
            GetPotentialCapabilities: None,
            reserved141: ptr::null(),
            AddCapabilities: None,
            functions143_156: [ptr::null(); 14],
        }
    }
}

#[repr(C)]
pub struct jvmtiEnv {
    pub functions: *const jvmtiInterface_1_,
}

// =========================================================================
// FUNCTION TYPEDEFS: EVENT CALLBACKS
// =========================================================================

pub type JvmtiVMInitFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread
);

pub type JvmtiClassFileLoadHookFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    class_being_redefined: jclass,
    loader: jobject,
    name: *const c_char,
    protection_domain: jobject,
    class_data_len: jint,
    class_data: *const c_uchar,
    new_class_data_len: *mut jint,
    new_class_data: *mut *mut c_uchar,
);

pub type JvmtiNativeMethodBindFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread,
    method: jmethodID,
    address: *mut c_void,
    new_address_ptr: *mut *mut c_void
);

pub type JvmtiMonitorContendedEnterFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv, jni_env: *mut JNIEnv, thread: jthread, object: jobject
);

pub type JvmtiMonitorContendedEnteredFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv, jni_env: *mut JNIEnv, thread: jthread, object: jobject
);

pub type JvmtiVMObjectAllocFn = unsafe extern "system" fn(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    thread: jthread,
    object: jobject,
    object_klass: jclass,
    size: jlong
);

/// A callback slot the agent never fills. Only its size matters.
pub type JvmtiUnusedEventFn = unsafe extern "system" fn();

/// Indexed by `event - JVMTI_EVENT_VM_INIT`, reserved slots included.
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct jvmtiEventCallbacks {
    pub VMInit: Option<JvmtiVMInitFn>,                                  /* 50 */
    pub VMDeath: Option<JvmtiUnusedEventFn>,                            /* 51 */
    pub ThreadStart: Option<JvmtiUnusedEventFn>,                        /* 52 */
    pub ThreadEnd: Option<JvmtiUnusedEventFn>,                          /* 53 */
    pub ClassFileLoadHook: Option<JvmtiClassFileLoadHookFn>,            /* 54 */
    pub ClassLoad: Option<JvmtiUnusedEventFn>,                          /* 55 */
    pub ClassPrepare: Option<JvmtiUnusedEventFn>,                       /* 56 */
    pub VMStart: Option<JvmtiUnusedEventFn>,                            /* 57 */
    pub Exception: Option<JvmtiUnusedEventFn>,                          /* 58 */
    pub ExceptionCatch: Option<JvmtiUnusedEventFn>,                     /* 59 */
    pub SingleStep: Option<JvmtiUnusedEventFn>,                         /* 60 */
    pub FramePop: Option<JvmtiUnusedEventFn>,                           /* 61 */
    pub Breakpoint: Option<JvmtiUnusedEventFn>,                         /* 62 */
    pub FieldAccess: Option<JvmtiUnusedEventFn>,                        /* 63 */
    pub FieldModification: Option<JvmtiUnusedEventFn>,                  /* 64 */
    pub MethodEntry: Option<JvmtiUnusedEventFn>,                        /* 65 */
    pub MethodExit: Option<JvmtiUnusedEventFn>,                         /* 66 */
    pub NativeMethodBind: Option<JvmtiNativeMethodBindFn>,              /* 67 */
    pub CompiledMethodLoad: Option<JvmtiUnusedEventFn>,                 /* 68 */
    pub CompiledMethodUnload: Option<JvmtiUnusedEventFn>,               /* 69 */
    pub DynamicCodeGenerated: Option<JvmtiUnusedEventFn>,               /* 70 */
    pub DataDumpRequest: Option<JvmtiUnusedEventFn>,                    /* 71 */
    pub reserved72: Option<JvmtiUnusedEventFn>,                         /* 72 */
    pub MonitorWait: Option<JvmtiUnusedEventFn>,                        /* 73 */
    pub MonitorWaited: Option<JvmtiUnusedEventFn>,                      /* 74 */
    pub MonitorContendedEnter: Option<JvmtiMonitorContendedEnterFn>,    /* 75 */
    pub MonitorContendedEntered: Option<JvmtiMonitorContendedEnteredFn>,/* 76 */
    pub reserved77: Option<JvmtiUnusedEventFn>,                         /* 77 */
    pub reserved78: Option<JvmtiUnusedEventFn>,                         /* 78 */
    pub reserved79: Option<JvmtiUnusedEventFn>,                         /* 79 */
    pub ResourceExhausted: Option<JvmtiUnusedEventFn>,                  /* 80 */
    pub GarbageCollectionStart: Option<JvmtiUnusedEventFn>,             /* 81 */
    pub GarbageCollectionFinish: Option<JvmtiUnusedEventFn>,            /* 82 */
    pub ObjectFree: Option<JvmtiUnusedEventFn>,                         /* 83 */
    pub VMObjectAlloc: Option<JvmtiVMObjectAllocFn>,                    /* 84 */
    pub reserved85: Option<JvmtiUnusedEventFn>,                         /* 85 */
    pub SampledObjectAlloc: Option<JvmtiUnusedEventFn>,                 /* 86 */
}
