use std::sync::atomic::{AtomicU64, Ordering};

use profiler_agent::prelude::*;

#[derive(Default)]
struct Hooks {
    classes_loaded: AtomicU64,
    native_binds: AtomicU64,
    contentions: AtomicU64,
    allocations: AtomicU64,
}

impl EventHooks for Hooks {
    fn class_file_load_hook(
        &self,
        _jni: *mut jni::JNIEnv,
        _class_being_redefined: jni::jclass,
        _loader: jni::jobject,
        name: *const std::os::raw::c_char,
        _protection_domain: jni::jobject,
        class_data_len: jni::jint,
        _class_data: *const std::os::raw::c_uchar,
        _new_class_data_len: *mut jni::jint,
        _new_class_data: *mut *mut std::os::raw::c_uchar,
    ) {
        self.classes_loaded.fetch_add(1, Ordering::Relaxed);
        if log::log_enabled!(log::Level::Trace) {
            let class_name = if name.is_null() {
                "<unknown>".into()
            } else {
                unsafe { std::ffi::CStr::from_ptr(name) }.to_string_lossy()
            };
            log::trace!("loaded {} ({} bytes)", class_name, class_data_len);
        }
    }

    fn native_method_bind(
        &self,
        _jni: *mut jni::JNIEnv,
        _thread: jni::jthread,
        _method: jni::jmethodID,
        _address: *mut std::os::raw::c_void,
        _new_address_ptr: *mut *mut std::os::raw::c_void,
    ) {
        self.native_binds.fetch_add(1, Ordering::Relaxed);
    }

    fn monitor_contended_enter(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, _object: jni::jobject) {
        self.contentions.fetch_add(1, Ordering::Relaxed);
    }

    fn vm_object_alloc(
        &self,
        _jni: *mut jni::JNIEnv,
        _thread: jni::jthread,
        _object: jni::jobject,
        _klass: jni::jclass,
        _size: jni::jlong,
    ) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    fn runtime_ready(&self, _jni: *mut jni::JNIEnv, _thread: jni::jthread, options: &AgentOptions) {
        log::info!(
            "runtime ready at {:?}ns: {} classes loaded so far, server libraries in {}, port {}",
            nano_time(),
            self.classes_loaded.load(Ordering::Relaxed),
            options.library_path.display(),
            options.port
        );
    }
}

export_agent!(Hooks);
