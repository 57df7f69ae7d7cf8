//! # profiler-agent
//!
//! The native half of a JVM profiler: the code that runs inside the profiled
//! process, negotiates JVMTI capabilities, registers the event callbacks a
//! profiling server needs and performs the startup handshake.
//!
//! What each hook *does* (rewriting class files, taking timestamps, talking to
//! the server) is not decided here. The embedding crate supplies that through
//! [`EventHooks`] and exports the library with [`export_agent!`].
//!
//! ## Quick Start
//!
//! **1. Configure Cargo.toml:**
//! ```toml
//! [lib]
//! name = "profilerinterface"
//! crate-type = ["cdylib"]
//!
//! [dependencies]
//! profiler-agent = "0.1"
//! ```
//!
//! **2. Implement the hooks (src/lib.rs):**
//! ```rust,ignore
//! use profiler_agent::{export_agent, EventHooks};
//! use profiler_agent::options::AgentOptions;
//! use profiler_agent::sys::jni;
//!
//! #[derive(Default)]
//! struct Hooks;
//!
//! impl EventHooks for Hooks {
//!     fn runtime_ready(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, options: &AgentOptions) {
//!         println!("connecting to port {}", options.port);
//!     }
//! }
//!
//! export_agent!(Hooks);
//! ```
//!
//! **3. Build and run:**
//! ```bash
//! cargo build --release
//! java -agentpath:./target/release/libprofilerinterface.so=/opt/profiler/libs,5140 MyApp
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │             JNI_OnLoad / Agent_OnLoad                    │
//! │     export_agent!, ProfilerAgent, trampolines            │
//! ├─────────────────────────────────────────────────────────┤
//! │                  bootstrap::AgentContext                 │
//! │   capabilities -> callbacks -> events -> options         │
//! ├─────────────────────────────────────────────────────────┤
//! │              env::{HostVm, Instrumentation}              │
//! │   env::JavaVm, env::Jvmti over the raw pointers          │
//! ├─────────────────────────────────────────────────────────┤
//! │              Raw FFI Bindings (sys module)               │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through the `log` facade. The exported entry points install
//! `env_logger`, filtered by the `PROFILER_AGENT_LOG` environment variable
//! (default `warn`). The `Profiler Agent: ...` progress lines are printed
//! directly and do not depend on the filter.

pub mod sys;
pub mod env;

#[doc(hidden)]
pub mod jvmti_wrapper;

pub mod bootstrap;
pub mod callbacks;
pub mod capabilities;
pub mod console;
pub mod error;
pub mod events;
pub mod options;
pub mod prelude;

use std::ffi::CStr;
use std::os::raw::{c_char, c_uchar, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use crate::bootstrap::AgentContext;
use crate::env::{Instrumentation, JavaVm, Jvmti};
use crate::options::AgentOptions;
pub use crate::sys::jni as jni;
use crate::sys::jvmti as jvmti;

/// Environment variable holding the `env_logger` filter.
pub const LOG_ENV: &str = "PROFILER_AGENT_LOG";

/// The hook bodies invoked for each registered event.
///
/// Every method defaults to a no-op. Hooks are called from arbitrary VM
/// threads, concurrently and possibly reentrantly, so implementations manage
/// their own synchronization.
pub trait EventHooks: Send + Sync {
    /// Class bytes are about to be loaded or redefined.
    ///
    /// To replace them, allocate with JVMTI `Allocate` and set
    /// `new_class_data_len` / `new_class_data`.
    #[allow(clippy::too_many_arguments)]
    fn class_file_load_hook(&self, _jni: *mut jni::JNIEnv, _class_being_redefined: jni::jclass,
                            _loader: jni::jobject, _name: *const c_char,
                            _protection_domain: jni::jobject, _class_data_len: jni::jint,
                            _class_data: *const c_uchar,
                            _new_class_data_len: *mut jni::jint,
                            _new_class_data: *mut *mut c_uchar) {}

    /// A native method is being bound. Write `*new_address_ptr` to redirect it.
    fn native_method_bind(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _method: jni::jmethodID,
                          _address: *mut c_void, _new_address_ptr: *mut *mut c_void) {}

    /// A thread is about to block on a contended monitor.
    fn monitor_contended_enter(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _object: jni::jobject) {}

    /// A thread acquired a previously contended monitor.
    fn monitor_contended_entered(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _object: jni::jobject) {}

    /// The VM allocated an object outside of bytecode.
    fn vm_object_alloc(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _object: jni::jobject,
                       _klass: jni::jclass, _size: jni::jlong) {}

    /// The runtime finished initializing. Only armed by a dynamic attach that
    /// carried a well-formed option string.
    fn runtime_ready(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _options: &AgentOptions) {}
}

/// The process-wide agent: the user's hooks plus the bootstrap state.
pub struct ProfilerAgent {
    hooks: Box<dyn EventHooks>,
    context: AgentContext<Jvmti>,
}

impl ProfilerAgent {
    pub fn hooks(&self) -> &dyn EventHooks {
        self.hooks.as_ref()
    }

    pub fn context(&self) -> &AgentContext<Jvmti> {
        &self.context
    }
}

/// Read by the trampolines the VM calls.
pub static GLOBAL_AGENT: OnceLock<ProfilerAgent> = OnceLock::new();

/// Creates the process-wide agent on first use. Later calls return the
/// existing one and never invoke `make`.
pub fn install_agent<F>(make: F) -> &'static ProfilerAgent
where
    F: FnOnce() -> Box<dyn EventHooks>,
{
    GLOBAL_AGENT.get_or_init(|| ProfilerAgent {
        hooks: make(),
        context: AgentContext::new(),
    })
}

/// The host's high-resolution timer, once a handle has been acquired.
pub fn nano_time() -> Option<jni::jlong> {
    let handle = GLOBAL_AGENT.get()?.context.handle()?;
    match handle.time() {
        Ok(nanos) => Some(nanos),
        Err(err) => {
            log::warn!("GetTime failed: {}", err);
            None
        }
    }
}

fn init_logging() {
    let env = env_logger::Env::new().filter_or(LOG_ENV, "warn");
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Body of the exported `JNI_OnLoad`.
///
/// # Safety
/// `vm` must be the `JavaVM*` the VM passed to `JNI_OnLoad`.
pub unsafe fn jni_on_load<F>(vm: *mut jni::JavaVM, make: F) -> jni::jint
where
    F: FnOnce() -> Box<dyn EventHooks>,
{
    init_logging();
    let host = JavaVm::from_raw(vm);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let agent = install_agent(make);
        match agent.context.on_process_creation(&host) {
            Ok(startup) => startup.status(),
            Err(err) => err.status(),
        }
    }));
    result.unwrap_or_else(|_| {
        log::error!("panic during JNI_OnLoad");
        jni::JNI_ERR
    })
}

/// Body of the exported `Agent_OnLoad`.
///
/// # Safety
/// `vm` must be the `JavaVM*` the VM passed to `Agent_OnLoad`, and `options`
/// null or a NUL-terminated string.
pub unsafe fn agent_on_load<F>(vm: *mut jni::JavaVM, options: *const c_char, make: F) -> jni::jint
where
    F: FnOnce() -> Box<dyn EventHooks>,
{
    init_logging();
    let host = JavaVm::from_raw(vm);
    let options = if options.is_null() {
        None
    } else {
        Some(CStr::from_ptr(options).to_string_lossy().into_owned())
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let agent = install_agent(make);
        match agent.context.on_dynamic_attach(&host, options.as_deref()) {
            Ok(startup) => startup.status(),
            Err(err) => err.status(),
        }
    }));
    result.unwrap_or_else(|_| {
        log::error!("panic during Agent_OnLoad");
        jni::JNI_ERR
    })
}

fn dispatch<F>(event: &str, f: F)
where
    F: FnOnce(&ProfilerAgent),
{
    if let Some(agent) = GLOBAL_AGENT.get() {
        if panic::catch_unwind(AssertUnwindSafe(|| f(agent))).is_err() {
            log::error!("{} hook panicked", event);
        }
    }
}

pub(crate) unsafe extern "system" fn trampoline_vm_init(_env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread) {
    dispatch("VMInit", |agent| match agent.context.options() {
        Some(options) => agent.hooks.runtime_ready(jni, thread, options),
        None => log::warn!("VMInit delivered without agent options"),
    });
}

pub(crate) unsafe extern "system" fn trampoline_class_file_load_hook(
    _env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv,
    class_being_redefined: jni::jclass, loader: jni::jobject, name: *const c_char,
    protection_domain: jni::jobject, class_data_len: jni::jint, class_data: *const c_uchar,
    new_class_data_len: *mut jni::jint, new_class_data: *mut *mut c_uchar
) {
    dispatch("ClassFileLoadHook", |agent| {
        agent.hooks.class_file_load_hook(jni, class_being_redefined, loader, name, protection_domain,
                                         class_data_len, class_data, new_class_data_len, new_class_data);
    });
}

pub(crate) unsafe extern "system" fn trampoline_native_method_bind(
    _env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread, method: jni::jmethodID,
    address: *mut c_void, new_address_ptr: *mut *mut c_void
) {
    dispatch("NativeMethodBind", |agent| {
        agent.hooks.native_method_bind(jni, thread, method, address, new_address_ptr);
    });
}

pub(crate) unsafe extern "system" fn trampoline_monitor_contended_enter(_env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread, object: jni::jobject) {
    dispatch("MonitorContendedEnter", |agent| agent.hooks.monitor_contended_enter(jni, thread, object));
}

pub(crate) unsafe extern "system" fn trampoline_monitor_contended_entered(_env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread, object: jni::jobject) {
    dispatch("MonitorContendedEntered", |agent| agent.hooks.monitor_contended_entered(jni, thread, object));
}

pub(crate) unsafe extern "system" fn trampoline_vm_object_alloc(
    _env: *mut jvmti::jvmtiEnv, jni: *mut jni::JNIEnv, thread: jni::jthread,
    object: jni::jobject, klass: jni::jclass, size: jni::jlong
) {
    dispatch("VMObjectAlloc", |agent| agent.hooks.vm_object_alloc(jni, thread, object, klass, size));
}

/// Exports a hooks type as a loadable profiler agent library.
///
/// Generates `JNI_OnLoad` (library loaded at process creation) and
/// `Agent_OnLoad` (loaded via `-agentpath:<lib>=<options>`). The first one to
/// run creates the process-wide [`ProfilerAgent`] from `<$hooks>::default()`.
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct Hooks;
/// impl profiler_agent::EventHooks for Hooks {}
///
/// profiler_agent::export_agent!(Hooks);
/// ```
///
/// The embedding crate must be built with `crate-type = ["cdylib"]`.
///
/// # Return Values
///
/// - `JNI_OnLoad`: [`jni::JNI_VERSION_1_2`] on success, negative on failure.
/// - `Agent_OnLoad`: [`jni::JNI_OK`] on success, [`jni::JNI_ERR`] on a
///   malformed option string or a fatal JVMTI failure.
#[macro_export]
macro_rules! export_agent {
    ($hooks:ty) => {
        #[no_mangle]
        pub unsafe extern "system" fn JNI_OnLoad(
            vm: *mut $crate::sys::jni::JavaVM,
            _reserved: *mut std::ffi::c_void,
        ) -> $crate::sys::jni::jint {
            $crate::jni_on_load(vm, || -> Box<dyn $crate::EventHooks> {
                Box::new(<$hooks>::default())
            })
        }

        #[no_mangle]
        pub unsafe extern "system" fn Agent_OnLoad(
            vm: *mut $crate::sys::jni::JavaVM,
            options: *mut std::ffi::c_char,
            _reserved: *mut std::ffi::c_void,
        ) -> $crate::sys::jni::jint {
            $crate::agent_on_load(vm, options, || -> Box<dyn $crate::EventHooks> {
                Box::new(<$hooks>::default())
            })
        }
    };
}
