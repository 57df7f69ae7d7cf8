mod common;

use std::path::PathBuf;
use std::time::Duration;

use common::{context, Behaviour, Call, FakeHost, Stream};
use profiler_agent::bootstrap::{EntryPoint, Stage, Startup};
use profiler_agent::callbacks::EventKind;
use profiler_agent::capabilities::{self, Capability};
use profiler_agent::error::AgentError;
use profiler_agent::events::PROFILING_EVENTS;
use profiler_agent::options::{OptionsError, USAGE};
use profiler_agent::sys::jni;
use profiler_agent::sys::jvmti::{self, jvmtiCapabilities, jvmtiError};

const PROFILING_SLOTS: [EventKind; 5] = [
    EventKind::ClassFileLoadHook,
    EventKind::NativeMethodBind,
    EventKind::MonitorContendedEnter,
    EventKind::MonitorContendedEntered,
    EventKind::VmObjectAlloc,
];

fn with_runtime_ready() -> Vec<EventKind> {
    let mut kinds = vec![EventKind::VmInit];
    kinds.extend(PROFILING_SLOTS);
    kinds
}

fn usage_lines() -> Vec<String> {
    USAGE.iter().map(|line| line.to_string()).collect()
}

#[test]
fn process_creation_runs_full_sequence() {
    let host = FakeHost::new();
    let (ctx, console) = context();

    assert_eq!(ctx.stage(), Stage::Unattached);
    assert_eq!(ctx.on_process_creation(&host).unwrap(), Startup::Initialized);

    assert_eq!(ctx.stage(), Stage::Ready);
    assert!(ctx.handle().is_some());
    assert_eq!(ctx.table().unwrap().installed(), PROFILING_SLOTS.to_vec());
    assert!(ctx.options().is_none());
    assert_eq!(
        console.stdout(),
        vec![
            "Profiler Agent: JNI OnLoad Initializing...",
            "Profiler Agent: JNI OnLoad Initialized successfully",
        ]
    );
    assert!(console.stderr().is_empty());
    assert_eq!(host.enabled(), PROFILING_EVENTS.to_vec());
}

#[test]
fn process_creation_twice_negotiates_and_registers_once() {
    let host = FakeHost::new();
    let (ctx, console) = context();

    assert_eq!(ctx.on_process_creation(&host).unwrap(), Startup::Initialized);
    let again = ctx.on_process_creation(&host).unwrap();
    assert_eq!(again, Startup::AlreadyInitialized);
    assert_eq!(again.entry_point(), EntryPoint::ProcessCreation);
    assert_eq!(again.status(), jni::JNI_VERSION_1_2);

    assert_eq!(host.acquisitions(), 1);
    assert_eq!(host.count(|c| matches!(c, Call::AddCapabilities(_))), 1);
    assert_eq!(host.registrations().len(), 1);
    assert_eq!(host.enabled().len(), PROFILING_EVENTS.len());
    assert_eq!(console.stdout().len(), 2);
}

#[test]
fn capability_refusal_does_not_stop_bootstrap() {
    let mut potential = jvmtiCapabilities::default();
    for cap in capabilities::PROFILING {
        if cap != Capability::RetransformClasses && cap != Capability::MonitorInfo {
            cap.add_to(&mut potential);
        }
    }
    let host = FakeHost::with_behaviour(Behaviour {
        add_capabilities: Err(jvmtiError::NOT_AVAILABLE),
        potential: Ok(potential),
        ..Behaviour::default()
    });
    let (ctx, console) = context();

    assert_eq!(ctx.on_process_creation(&host).unwrap(), Startup::Initialized);

    assert_eq!(ctx.stage(), Stage::Ready);
    assert_eq!(
        console.stderr(),
        vec!["Profiler Agent Error: Failed to obtain JVMTI capabilities, error code: 98"]
    );
    assert_eq!(host.enabled(), PROFILING_EVENTS.to_vec());
    assert_eq!(host.count(|c| matches!(c, Call::AddCapabilities(_))), 1);
    assert_eq!(host.count(|c| *c == Call::PotentialCapabilities), 1);
}

#[test]
fn negotiation_reports_missing_capabilities() {
    let host = FakeHost::with_behaviour(Behaviour {
        add_capabilities: Err(jvmtiError::NOT_AVAILABLE),
        ..Behaviour::default()
    });

    let negotiation = capabilities::negotiate(&host.env());

    assert!(!negotiation.is_complete());
    assert_eq!(negotiation.requested, capabilities::PROFILING.to_vec());
    assert_eq!(negotiation.missing, capabilities::PROFILING.to_vec());
}

#[test]
fn negotiation_requests_full_set_on_top_of_possessed() {
    let mut possessed = jvmtiCapabilities::default();
    possessed.set_can_get_monitor_info(true);
    let host = FakeHost::with_behaviour(Behaviour {
        possessed: Ok(possessed),
        ..Behaviour::default()
    });

    let negotiation = capabilities::negotiate(&host.env());
    assert!(negotiation.is_complete());
    assert!(negotiation.missing.is_empty());

    let requested = host
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::AddCapabilities(caps) => Some(caps),
            _ => None,
        })
        .unwrap();
    for cap in capabilities::PROFILING {
        assert!(cap.is_set(&requested), "{} was not requested", cap);
    }
    assert_eq!(
        &host.calls()[..2],
        &[Call::Version, Call::GetCapabilities]
    );
}

#[test]
fn retransform_is_only_requested_from_version_1_1() {
    let host = FakeHost::with_behaviour(Behaviour {
        version: Ok(jvmti::JVMTI_VERSION_1_0),
        ..Behaviour::default()
    });

    let negotiation = capabilities::negotiate(&host.env());

    assert!(!negotiation.requested.contains(&Capability::RetransformClasses));
    let Some(Call::AddCapabilities(caps)) = host.calls().into_iter().find(|c| matches!(c, Call::AddCapabilities(_))) else {
        panic!("AddCapabilities was not called");
    };
    assert!(!caps.can_retransform_classes());
    assert!(caps.can_redefine_classes());
}

#[test]
fn unreadable_version_is_treated_as_1_0() {
    let host = FakeHost::with_behaviour(Behaviour {
        version: Err(jvmtiError::WRONG_PHASE),
        possessed: Err(jvmtiError::INTERNAL),
        ..Behaviour::default()
    });

    let negotiation = capabilities::negotiate(&host.env());

    assert_eq!(negotiation.version, jvmti::JVMTI_VERSION_1_0);
    assert_eq!(negotiation.requested.len(), 7);
    assert!(negotiation.is_complete());
}

#[test]
fn notifications_follow_registration_of_all_slots() {
    let host = FakeHost::new();
    let (ctx, _console) = context();

    ctx.on_dynamic_attach(&host, Some("/home/me/server,5500")).unwrap();

    let calls = host.calls();
    let first_registration = calls
        .iter()
        .position(|c| matches!(c, Call::SetCallbacks(_)))
        .unwrap();
    let first_enable = calls.iter().position(|c| matches!(c, Call::Enable(_))).unwrap();
    assert!(first_registration < first_enable);
    assert_eq!(calls[first_registration], Call::SetCallbacks(PROFILING_SLOTS.to_vec()));

    let vm_init_registration = calls
        .iter()
        .position(|c| *c == Call::SetCallbacks(with_runtime_ready()))
        .unwrap();
    let vm_init_enable = calls
        .iter()
        .position(|c| *c == Call::Enable(EventKind::VmInit))
        .unwrap();
    assert!(vm_init_registration < vm_init_enable);
}

#[test]
fn attach_with_options_arms_runtime_ready() {
    let host = FakeHost::new();
    let (ctx, console) = context();

    let startup = ctx.on_dynamic_attach(&host, Some("/home/me/server,5500")).unwrap();

    assert_eq!(startup, Startup::Armed);
    assert_eq!(startup.entry_point(), EntryPoint::DynamicAttach);
    assert_eq!(startup.status(), jni::JNI_OK);
    assert_eq!(ctx.stage(), Stage::Ready);
    assert_eq!(ctx.table().unwrap().installed(), with_runtime_ready());

    let options = ctx.options().unwrap();
    assert_eq!(options.library_path, PathBuf::from("/home/me/server"));
    assert_eq!(options.port, 5500);

    let mut expected = PROFILING_EVENTS.to_vec();
    expected.push(EventKind::VmInit);
    assert_eq!(host.enabled(), expected);

    assert_eq!(
        console.stdout(),
        vec![
            "Profiler Agent: Initializing...",
            "Profiler Agent: Options: >/home/me/server,5500<",
            "Profiler Agent: Initialized successfully",
        ]
    );
    assert!(console.stderr().is_empty());
}

#[test]
fn attach_without_options_is_a_calibration_run() {
    for (options, echo) in [
        (None, "Profiler Agent: No options"),
        (Some(""), "Profiler Agent: Options: ><"),
    ] {
        let host = FakeHost::new();
        let (ctx, console) = context();

        let startup = ctx.on_dynamic_attach(&host, options).unwrap();

        assert_eq!(startup, Startup::Calibration);
        assert_eq!(ctx.stage(), Stage::Ready);
        assert!(ctx.options().is_none());
        assert!(!ctx.table().unwrap().is_installed(EventKind::VmInit));
        assert!(!host.enabled().contains(&EventKind::VmInit));
        assert_eq!(host.registrations().len(), 1);
        assert_eq!(
            console.stdout(),
            vec![
                "Profiler Agent: Initializing...",
                echo,
                "Profiler Agent: Initialized successfully",
            ]
        );
        assert!(console.stderr().is_empty());
    }
}

#[test]
fn table_follows_the_last_registration() {
    let host = FakeHost::new();
    let (ctx, _console) = context();
    assert!(ctx.table().is_none());

    ctx.on_process_creation(&host).unwrap();
    assert_eq!(ctx.table().unwrap().installed(), PROFILING_SLOTS.to_vec());

    ctx.on_dynamic_attach(&host, Some("/home/me/server,5500")).unwrap();
    assert_eq!(ctx.table().unwrap().installed(), with_runtime_ready());
    assert_eq!(host.registrations().last().unwrap(), &with_runtime_ready());

    // A later calibration run registers the profiling table again.
    ctx.on_dynamic_attach(&host, None).unwrap();
    assert_eq!(ctx.table().unwrap().installed(), PROFILING_SLOTS.to_vec());
    assert_eq!(host.registrations().last().unwrap(), &PROFILING_SLOTS.to_vec());
    assert_eq!(host.registrations().len(), 4);
}

#[test]
fn option_without_separator_prints_usage() {
    let host = FakeHost::new();
    let (ctx, console) = context();

    let err = ctx.on_dynamic_attach(&host, Some("5500")).unwrap_err();

    assert!(matches!(err, AgentError::Usage(ref raw) if raw == "5500"));
    assert!(!err.is_fatal());
    assert_eq!(err.status(), jni::JNI_ERR);
    assert_eq!(ctx.stage(), Stage::NotificationsEnabled);
    assert!(ctx.options().is_none());
    assert!(!host.enabled().contains(&EventKind::VmInit));
    assert_eq!(console.stderr(), usage_lines());
    assert_eq!(
        console.stdout(),
        vec![
            "Profiler Agent: Initializing...",
            "Profiler Agent: Options: >5500<",
        ]
    );

    // usage goes to stderr after the options echo
    let lines = console.lines();
    assert_eq!(lines[1], (Stream::Out, "Profiler Agent: Options: >5500<".to_string()));
    assert_eq!(lines[2].0, Stream::Err);
}

#[test]
fn unparsable_port_is_reported_like_usage() {
    let host = FakeHost::new();
    let (ctx, console) = context();

    let err = ctx.on_dynamic_attach(&host, Some("/home/me/server,http")).unwrap_err();

    assert!(matches!(
        err,
        AgentError::Options(OptionsError::InvalidPort(ref port)) if port == "http"
    ));
    assert_eq!(err.status(), jni::JNI_ERR);
    assert_eq!(console.stderr(), usage_lines());
    assert!(!host.enabled().contains(&EventKind::VmInit));
}

#[test]
fn trailing_fields_are_left_to_the_parser() {
    let host = FakeHost::new();
    let (ctx, console) = context();

    let startup = ctx.on_dynamic_attach(&host, Some("/home/me/server,5500,extra")).unwrap();

    assert_eq!(startup, Startup::Armed);
    let options = ctx.options().unwrap();
    assert_eq!(options.extra, vec!["extra".to_string()]);
    assert_eq!(options.connect_timeout, None);
    assert!(console.stderr().is_empty());

    let (ctx, _) = context();
    ctx.on_dynamic_attach(&FakeHost::new(), Some("/srv,5140,15")).unwrap();
    assert_eq!(ctx.options().unwrap().connect_timeout, Some(Duration::from_secs(15)));
}

#[test]
fn callback_registration_failure_is_fatal() {
    let host = FakeHost::with_behaviour(Behaviour {
        set_callbacks: Err(jvmtiError::INTERNAL),
        ..Behaviour::default()
    });
    let (ctx, console) = context();

    let err = ctx.on_process_creation(&host).unwrap_err();

    assert!(matches!(err, AgentError::CallbackRegistration(jvmtiError::INTERNAL)));
    assert!(err.is_fatal());
    assert_eq!(err.status(), jni::JNI_ERR);
    assert_eq!(ctx.stage(), Stage::CapabilitiesNegotiated);
    assert!(host.enabled().is_empty());
    assert_eq!(
        console.stderr(),
        vec!["Profiler Agent Error: failed to register event callbacks: JVMTI_ERROR_INTERNAL (113)"]
    );
    assert_eq!(console.stdout(), vec!["Profiler Agent: JNI OnLoad Initializing..."]);
}

#[test]
fn refused_notification_is_fatal() {
    let host = FakeHost::with_behaviour(Behaviour {
        refuse_event: Some((EventKind::MonitorContendedEnter, jvmtiError::MUST_POSSESS_CAPABILITY)),
        ..Behaviour::default()
    });
    let (ctx, console) = context();

    let err = ctx.on_dynamic_attach(&host, Some("/home/me/server,5500")).unwrap_err();

    assert!(matches!(
        err,
        AgentError::NotificationRefused {
            event: EventKind::MonitorContendedEnter,
            code: jvmtiError::MUST_POSSESS_CAPABILITY,
        }
    ));
    assert_eq!(ctx.stage(), Stage::CallbacksRegistered);
    assert!(ctx.options().is_none());
    assert_eq!(
        host.enabled(),
        vec![
            EventKind::ClassFileLoadHook,
            EventKind::NativeMethodBind,
            EventKind::MonitorContendedEnter,
        ]
    );
    assert_eq!(console.stderr().len(), 1);
    assert!(console.stderr()[0].starts_with("Profiler Agent Error: failed to enable MonitorContendedEnter"));
}

#[test]
fn missing_environment_returns_host_status() {
    let host = FakeHost::unavailable(jni::JNI_EVERSION);
    let (ctx, console) = context();

    let err = ctx.on_process_creation(&host).unwrap_err();

    assert_eq!(err.status(), jni::JNI_EVERSION);
    assert_eq!(ctx.stage(), Stage::Unattached);
    assert!(ctx.handle().is_none());
    assert!(host.calls().is_empty());
    assert_eq!(console.stderr().len(), 1);

    // no handle was stored, so a later entry tries again
    let _ = ctx.on_process_creation(&host);
    assert_eq!(host.acquisitions(), 2);
}

#[test]
fn dynamic_attach_is_not_guarded_by_existing_handle() {
    let host = FakeHost::new();
    let (ctx, _console) = context();

    ctx.on_process_creation(&host).unwrap();
    let startup = ctx.on_dynamic_attach(&host, Some("/home/me/server,5500")).unwrap();

    assert_eq!(startup, Startup::Armed);
    assert_eq!(host.acquisitions(), 1);
    assert_eq!(host.count(|c| matches!(c, Call::AddCapabilities(_))), 2);
    assert!(ctx.options().is_some());
    assert_eq!(ctx.stage(), Stage::Ready);

    // the process-creation entry is still skipped afterwards
    assert_eq!(ctx.on_process_creation(&host).unwrap(), Startup::AlreadyInitialized);
}
