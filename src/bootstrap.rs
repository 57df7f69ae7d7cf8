//! The startup handshake.
//!
//! An [`AgentContext`] owns everything the bootstrap produces: the
//! instrumentation handle, the registered callback table and the parsed
//! options. The handle and options are written once; the table record follows
//! every registration the host accepts. All of them are read lock-free by the
//! event trampolines.
//!
//! There are two ways in:
//!
//! - [`AgentContext::on_process_creation`] (`JNI_OnLoad`) runs the sequence
//!   only if no handle exists yet.
//! - [`AgentContext::on_dynamic_attach`] (`Agent_OnLoad`) always runs it, then
//!   decides from the option string whether to arm the runtime-ready hook.
//!
//! ```text
//! Unattached -> HandleAcquired -> CapabilitiesNegotiated -> CallbacksRegistered
//!            -> NotificationsEnabled -> [OptionsParsed ->] Ready
//! ```

use std::sync::atomic::{AtomicU16, AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::callbacks::{self, CallbackTable, EventKind, Registered};
use crate::capabilities;
use crate::console::{Console, StdConsole};
use crate::env::{HostVm, Instrumentation};
use crate::error::{AgentError, Result};
use crate::events;
use crate::options::{self, AgentOptions};
use crate::sys::jni;

/// The last bootstrap state reached.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Unattached = 0,
    HandleAcquired = 1,
    CapabilitiesNegotiated = 2,
    CallbacksRegistered = 3,
    NotificationsEnabled = 4,
    OptionsParsed = 5,
    Ready = 6,
}

impl Stage {
    fn from_u8(value: u8) -> Stage {
        match value {
            1 => Stage::HandleAcquired,
            2 => Stage::CapabilitiesNegotiated,
            3 => Stage::CallbacksRegistered,
            4 => Stage::NotificationsEnabled,
            5 => Stage::OptionsParsed,
            6 => Stage::Ready,
            _ => Stage::Unattached,
        }
    }
}

/// Which exported function the host called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// `JNI_OnLoad`: the library was loaded as the process came up.
    ProcessCreation,
    /// `Agent_OnLoad`: loaded with an option string.
    DynamicAttach,
}

/// How a successful entry ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Process-creation entry after a handle already existed. Nothing ran.
    AlreadyInitialized,
    /// Process-creation entry ran the full sequence.
    Initialized,
    /// Dynamic attach without options. Nothing armed.
    Calibration,
    /// Dynamic attach with options. The runtime-ready hook is armed.
    Armed,
}

impl Startup {
    pub fn entry_point(self) -> EntryPoint {
        match self {
            Startup::AlreadyInitialized | Startup::Initialized => EntryPoint::ProcessCreation,
            Startup::Calibration | Startup::Armed => EntryPoint::DynamicAttach,
        }
    }

    /// What the exported function returns to the VM.
    pub fn status(self) -> jni::jint {
        match self.entry_point() {
            EntryPoint::ProcessCreation => jni::JNI_VERSION_1_2,
            EntryPoint::DynamicAttach => jni::JNI_OK,
        }
    }
}

const NO_TABLE: u16 = u16::MAX;

pub struct AgentContext<I> {
    handle: OnceLock<I>,
    /// `CallbackTable::bits` of the last accepted table, or `NO_TABLE`.
    table: AtomicU16,
    options: OnceLock<AgentOptions>,
    stage: AtomicU8,
    console: Box<dyn Console>,
}

impl<I: Instrumentation> Default for AgentContext<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Instrumentation> AgentContext<I> {
    pub fn new() -> Self {
        Self::with_console(Box::new(StdConsole))
    }

    pub fn with_console(console: Box<dyn Console>) -> Self {
        AgentContext {
            handle: OnceLock::new(),
            table: AtomicU16::new(NO_TABLE),
            options: OnceLock::new(),
            stage: AtomicU8::new(Stage::Unattached as u8),
            console,
        }
    }

    pub fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::Acquire))
    }

    /// The instrumentation handle, once acquired.
    pub fn handle(&self) -> Option<&I> {
        self.handle.get()
    }

    /// The table the host currently holds, once one has been registered.
    pub fn table(&self) -> Option<CallbackTable> {
        match self.table.load(Ordering::Acquire) {
            NO_TABLE => None,
            bits => Some(CallbackTable::from_bits(bits as u8)),
        }
    }

    /// Options from the first well-formed dynamic attach.
    pub fn options(&self) -> Option<&AgentOptions> {
        self.options.get()
    }

    /// Process-creation entry. Skipped entirely if a handle already exists.
    pub fn on_process_creation<H>(&self, host: &H) -> Result<Startup>
    where
        H: HostVm<Env = I>,
    {
        if self.handle.get().is_some() {
            log::debug!("instrumentation handle already present, skipping JNI_OnLoad initialization");
            return Ok(Startup::AlreadyInitialized);
        }

        self.console.out("Profiler Agent: JNI OnLoad Initializing...");
        let result = self.initialize(host).map(|_| {
            self.finish();
            self.console.out("Profiler Agent: JNI OnLoad Initialized successfully");
            Startup::Initialized
        });
        result.map_err(|err| self.report(err))
    }

    /// Option-carrying entry. Always runs the full sequence.
    ///
    /// An absent or empty option string is a calibration run. A non-empty one
    /// must have the `<path>,<port>` shape; anything else prints the usage
    /// message and fails without arming anything.
    pub fn on_dynamic_attach<H>(&self, host: &H, options: Option<&str>) -> Result<Startup>
    where
        H: HostVm<Env = I>,
    {
        self.console.out("Profiler Agent: Initializing...");
        let result = self.attach(host, options).map(|startup| {
            self.console.out("Profiler Agent: Initialized successfully");
            startup
        });
        result.map_err(|err| self.report(err))
    }

    fn attach<H>(&self, host: &H, options: Option<&str>) -> Result<Startup>
    where
        H: HostVm<Env = I>,
    {
        let (env, registered) = self.initialize(host)?;

        match options {
            Some(raw) => self.console.out(&format!("Profiler Agent: Options: >{}<", raw)),
            None => self.console.out("Profiler Agent: No options"),
        }
        let raw = match options.filter(|raw| !raw.is_empty()) {
            Some(raw) => raw,
            None => {
                self.finish();
                return Ok(Startup::Calibration);
            }
        };

        if !options::has_separator(raw) {
            return Err(AgentError::Usage(raw.to_string()));
        }

        let parsed = AgentOptions::parse(raw)?;
        log::debug!("parsed agent options: {:?}", parsed);
        if self.options.set(parsed).is_err() {
            log::warn!("agent options already set by an earlier attach, keeping those");
        }
        self.advance(Stage::OptionsParsed);

        let registered = callbacks::register(env, registered.table().with(EventKind::VmInit))?;
        self.record(&registered);
        events::enable(env, &registered, EventKind::VmInit)?;
        self.finish();
        Ok(Startup::Armed)
    }

    fn initialize<H>(&self, host: &H) -> Result<(&I, Registered)>
    where
        H: HostVm<Env = I>,
    {
        if self.handle.get().is_none() {
            let env = host.acquire_instrumentation()?;
            if self.handle.set(env).is_err() {
                log::debug!("instrumentation handle raced, keeping the first one");
            }
        }
        let env = self
            .handle
            .get()
            .ok_or(AgentError::EnvUnavailable(jni::JNI_ERR))?;
        self.advance(Stage::HandleAcquired);

        let negotiation = capabilities::negotiate(env);
        if let Err(code) = negotiation.outcome {
            self.console.err(&format!(
                "Profiler Agent Error: Failed to obtain JVMTI capabilities, error code: {}",
                code.0
            ));
        }
        self.advance(Stage::CapabilitiesNegotiated);

        let registered = callbacks::register(env, CallbackTable::profiling())?;
        self.record(&registered);
        self.advance(Stage::CallbacksRegistered);

        events::enable_profiling_events(env, &registered)?;
        self.advance(Stage::NotificationsEnabled);

        Ok((env, registered))
    }

    fn record(&self, registered: &Registered) {
        self.table.store(u16::from(registered.table().bits()), Ordering::Release);
    }

    fn finish(&self) {
        self.advance(Stage::Ready);
    }

    fn advance(&self, stage: Stage) {
        log::debug!("bootstrap stage: {:?}", stage);
        self.stage.store(stage as u8, Ordering::Release);
    }

    fn report(&self, err: AgentError) -> AgentError {
        if err.is_fatal() {
            log::error!("{}", err);
            self.console.err(&format!("Profiler Agent Error: {}", err));
        } else {
            log::warn!("{}", err);
            for line in options::USAGE {
                self.console.err(line);
            }
        }
        err
    }
}
