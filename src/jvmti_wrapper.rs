// profiler-agent/src/jvmti_wrapper.rs
use crate::callbacks::{CallbackTable, EventKind};
use crate::env::{HostVm, Instrumentation};
use crate::error::AgentError;
use crate::sys::jni;
use crate::sys::jvmti;
use std::ptr;

/// The `JavaVM*` passed to `JNI_OnLoad` / `Agent_OnLoad`.
pub struct JavaVm {
    vm: *mut jni::JavaVM,
}

impl JavaVm {
    /// # Safety
    /// `vm` must be the invocation interface pointer handed over by the VM.
    pub unsafe fn from_raw(vm: *mut jni::JavaVM) -> Self {
        JavaVm { vm }
    }

    pub fn raw(&self) -> *mut jni::JavaVM {
        self.vm
    }

    /// Retrieves a JVMTI environment of the requested interface version.
    pub fn get_env(&self, version: jni::jint) -> Result<Jvmti, jni::jint> {
        if self.vm.is_null() {
            return Err(jni::JNI_ERR);
        }
        let mut env_ptr: *mut std::ffi::c_void = ptr::null_mut();

        unsafe {
            // vm: *mut JavaVM = *mut *const JNIInvokeInterface_
            let vtable = *self.vm;
            if vtable.is_null() {
                return Err(jni::JNI_ERR);
            }
            let get_env_fn = (*vtable).GetEnv;

            let res = get_env_fn(self.vm, &mut env_ptr, version);
            if res != jni::JNI_OK {
                return Err(res);
            }
        }

        if env_ptr.is_null() {
            return Err(jni::JNI_ERR);
        }
        Ok(Jvmti {
            env: env_ptr as *mut jvmti::jvmtiEnv,
        })
    }
}

impl HostVm for JavaVm {
    type Env = Jvmti;

    /// Asks for JVMTI 1.1 first and settles for 1.0 on older VMs.
    fn acquire_instrumentation(&self) -> Result<Jvmti, AgentError> {
        match self.get_env(jvmti::JVMTI_VERSION_1_1) {
            Err(jni::JNI_EVERSION) => {
                log::debug!("JVMTI 1.1 not supported, falling back to 1.0");
                self.get_env(jvmti::JVMTI_VERSION_1_0)
            }
            other => other,
        }
        .map_err(AgentError::EnvUnavailable)
    }
}

/// A safe wrapper around the raw JVMTI Environment pointer.
pub struct Jvmti {
    env: *mut jvmti::jvmtiEnv,
}

// A JVMTI environment may be used from any thread once acquired.
unsafe impl Send for Jvmti {}
unsafe impl Sync for Jvmti {}

impl Jvmti {
    /// Create a Jvmti wrapper from a raw jvmtiEnv pointer
    ///
    /// # Safety
    /// The caller must ensure the pointer is valid for the duration of use.
    pub unsafe fn from_raw(env: *mut jvmti::jvmtiEnv) -> Self {
        Jvmti { env }
    }

    /// Get the raw jvmtiEnv pointer
    pub fn raw(&self) -> *mut jvmti::jvmtiEnv {
        self.env
    }

    fn functions(&self) -> Result<&jvmti::jvmtiInterface_1_, jvmti::jvmtiError> {
        unsafe {
            let table = (*self.env).functions;
            table.as_ref().ok_or(jvmti::jvmtiError::INVALID_ENVIRONMENT)
        }
    }

    pub fn get_version_number(&self) -> Result<jni::jint, jvmti::jvmtiError> {
        let get_version_fn = self.functions()?.GetVersionNumber.ok_or(jvmti::jvmtiError::NOT_AVAILABLE)?;
        let mut version: jni::jint = 0;

        unsafe { get_version_fn(self.env, &mut version) }.into_result()?;
        Ok(version)
    }

    pub fn get_capabilities(&self) -> Result<jvmti::jvmtiCapabilities, jvmti::jvmtiError> {
        let get_caps_fn = self.functions()?.GetCapabilities.ok_or(jvmti::jvmtiError::NOT_AVAILABLE)?;
        let mut caps = jvmti::jvmtiCapabilities::default();

        unsafe { get_caps_fn(self.env, &mut caps) }.into_result()?;
        Ok(caps)
    }

    pub fn get_potential_capabilities(&self) -> Result<jvmti::jvmtiCapabilities, jvmti::jvmtiError> {
        let get_potential_fn = self.functions()?.GetPotentialCapabilities.ok_or(jvmti::jvmtiError::NOT_AVAILABLE)?;
        let mut caps = jvmti::jvmtiCapabilities::default();

        unsafe { get_potential_fn(self.env, &mut caps) }.into_result()?;
        Ok(caps)
    }

    pub fn add_capabilities(&self, new_caps: &jvmti::jvmtiCapabilities) -> Result<(), jvmti::jvmtiError> {
        let add_caps_fn = self.functions()?.AddCapabilities.ok_or(jvmti::jvmtiError::NOT_AVAILABLE)?;

        unsafe { add_caps_fn(self.env, new_caps) }.into_result()
    }

    pub fn set_event_callbacks(&self, callbacks: &jvmti::jvmtiEventCallbacks) -> Result<(), jvmti::jvmtiError> {
        let set_callbacks_fn = self.functions()?.SetEventCallbacks.ok_or(jvmti::jvmtiError::NOT_AVAILABLE)?;
        let size = std::mem::size_of::<jvmti::jvmtiEventCallbacks>() as jni::jint;

        unsafe { set_callbacks_fn(self.env, callbacks, size) }.into_result()
    }

    pub fn set_event_notification_mode(&self, enable: bool, event_type: jvmti::jvmtiEvent, thread: jni::jthread) -> Result<(), jvmti::jvmtiError> {
        let set_mode_fn = self.functions()?.SetEventNotificationMode.ok_or(jvmti::jvmtiError::NOT_AVAILABLE)?;
        let mode = if enable { jvmti::JVMTI_ENABLE } else { jvmti::JVMTI_DISABLE };

        // thread can be null (all threads)
        unsafe { set_mode_fn(self.env, mode, event_type, thread) }.into_result()
    }

    pub fn get_time(&self) -> Result<jni::jlong, jvmti::jvmtiError> {
        let get_time_fn = self.functions()?.GetTime.ok_or(jvmti::jvmtiError::NOT_AVAILABLE)?;
        let mut nanos: jni::jlong = 0;

        unsafe { get_time_fn(self.env, &mut nanos) }.into_result()?;
        Ok(nanos)
    }
}

impl Instrumentation for Jvmti {
    fn version_number(&self) -> Result<jni::jint, jvmti::jvmtiError> {
        self.get_version_number()
    }

    fn capabilities(&self) -> Result<jvmti::jvmtiCapabilities, jvmti::jvmtiError> {
        self.get_capabilities()
    }

    fn potential_capabilities(&self) -> Result<jvmti::jvmtiCapabilities, jvmti::jvmtiError> {
        self.get_potential_capabilities()
    }

    fn add_capabilities(&self, caps: &jvmti::jvmtiCapabilities) -> Result<(), jvmti::jvmtiError> {
        Jvmti::add_capabilities(self, caps)
    }

    fn set_event_callbacks(&self, table: &CallbackTable) -> Result<(), jvmti::jvmtiError> {
        Jvmti::set_event_callbacks(self, &table.to_raw())
    }

    fn set_event_notification_mode(&self, enable: bool, event: EventKind) -> Result<(), jvmti::jvmtiError> {
        Jvmti::set_event_notification_mode(self, enable, event.event_type(), ptr::null_mut())
    }

    fn time(&self) -> Result<jni::jlong, jvmti::jvmtiError> {
        self.get_time()
    }
}
