#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use profiler_agent::bootstrap::AgentContext;
use profiler_agent::callbacks::{CallbackTable, EventKind};
use profiler_agent::console::Console;
use profiler_agent::env::{HostVm, Instrumentation};
use profiler_agent::error::AgentError;
use profiler_agent::sys::jni::{jint, jlong};
use profiler_agent::sys::jvmti::{self, jvmtiCapabilities, jvmtiError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Version,
    GetCapabilities,
    PotentialCapabilities,
    AddCapabilities(jvmtiCapabilities),
    SetCallbacks(Vec<EventKind>),
    Enable(EventKind),
}

/// How the fake host answers each JVMTI call.
#[derive(Clone)]
pub struct Behaviour {
    pub version: Result<jint, jvmtiError>,
    pub possessed: Result<jvmtiCapabilities, jvmtiError>,
    pub potential: Result<jvmtiCapabilities, jvmtiError>,
    pub add_capabilities: Result<(), jvmtiError>,
    pub set_callbacks: Result<(), jvmtiError>,
    pub refuse_event: Option<(EventKind, jvmtiError)>,
}

impl Default for Behaviour {
    fn default() -> Self {
        Behaviour {
            version: Ok(jvmti::JVMTI_VERSION_1_2),
            possessed: Ok(jvmtiCapabilities::default()),
            potential: Ok(jvmtiCapabilities::default()),
            add_capabilities: Ok(()),
            set_callbacks: Ok(()),
            refuse_event: None,
        }
    }
}

#[derive(Clone)]
pub struct FakeEnv {
    behaviour: Behaviour,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakeEnv {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Instrumentation for FakeEnv {
    fn version_number(&self) -> Result<jint, jvmtiError> {
        self.record(Call::Version);
        self.behaviour.version
    }

    fn capabilities(&self) -> Result<jvmtiCapabilities, jvmtiError> {
        self.record(Call::GetCapabilities);
        self.behaviour.possessed
    }

    fn potential_capabilities(&self) -> Result<jvmtiCapabilities, jvmtiError> {
        self.record(Call::PotentialCapabilities);
        self.behaviour.potential
    }

    fn add_capabilities(&self, caps: &jvmtiCapabilities) -> Result<(), jvmtiError> {
        self.record(Call::AddCapabilities(*caps));
        self.behaviour.add_capabilities
    }

    fn set_event_callbacks(&self, table: &CallbackTable) -> Result<(), jvmtiError> {
        self.record(Call::SetCallbacks(table.installed()));
        self.behaviour.set_callbacks
    }

    fn set_event_notification_mode(&self, enable: bool, event: EventKind) -> Result<(), jvmtiError> {
        assert!(enable, "the bootstrap never disables events");
        self.record(Call::Enable(event));
        match self.behaviour.refuse_event {
            Some((refused, code)) if refused == event => Err(code),
            _ => Ok(()),
        }
    }

    fn time(&self) -> Result<jlong, jvmtiError> {
        Ok(42)
    }
}

pub struct FakeHost {
    env: FakeEnv,
    unavailable: Option<jint>,
    acquisitions: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::with_behaviour(Behaviour::default())
    }

    pub fn with_behaviour(behaviour: Behaviour) -> Self {
        FakeHost {
            env: FakeEnv {
                behaviour,
                calls: Arc::new(Mutex::new(Vec::new())),
            },
            unavailable: None,
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// A host whose `GetEnv` fails with `code`.
    pub fn unavailable(code: jint) -> Self {
        let mut host = Self::new();
        host.unavailable = Some(code);
        host
    }

    pub fn env(&self) -> FakeEnv {
        self.env.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.env.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| pred(call)).count()
    }

    pub fn enabled(&self) -> Vec<EventKind> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Enable(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn registrations(&self) -> Vec<Vec<EventKind>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SetCallbacks(kinds) => Some(kinds),
                _ => None,
            })
            .collect()
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

impl HostVm for FakeHost {
    type Env = FakeEnv;

    fn acquire_instrumentation(&self) -> Result<FakeEnv, AgentError> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        match self.unavailable {
            Some(code) => Err(AgentError::EnvUnavailable(code)),
            None => Ok(self.env.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Out,
    Err,
}

#[derive(Clone, Default)]
pub struct RecordingConsole {
    lines: Arc<Mutex<Vec<(Stream, String)>>>,
}

impl RecordingConsole {
    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn stdout(&self) -> Vec<String> {
        self.stream(Stream::Out)
    }

    pub fn stderr(&self) -> Vec<String> {
        self.stream(Stream::Err)
    }

    fn stream(&self, which: Stream) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(stream, _)| *stream == which)
            .map(|(_, line)| line)
            .collect()
    }
}

impl Console for RecordingConsole {
    fn out(&self, line: &str) {
        self.lines.lock().unwrap().push((Stream::Out, line.to_string()));
    }

    fn err(&self, line: &str) {
        self.lines.lock().unwrap().push((Stream::Err, line.to_string()));
    }
}

pub fn context() -> (AgentContext<FakeEnv>, RecordingConsole) {
    let console = RecordingConsole::default();
    let context = AgentContext::with_console(Box::new(console.clone()));
    (context, console)
}
