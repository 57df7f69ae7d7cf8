//! Raw FFI bindings. Layouts mirror `jni.h` and `jvmti.h`.

pub mod jni;
pub mod jvmti;
