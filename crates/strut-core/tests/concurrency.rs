//! Operator writes racing a running looper

use std::thread;
use std::time::{Duration, Instant};

use strut_core::config::SelfTestTiming;
use strut_core::control::Wanted;
use strut_core::hardware::MockBinding;
use strut_core::subsystems::{SystemState, WantedState};
use strut_core::comm::TelemetryEntry;
use strut_core::{
    Climber, ClimberConfig, Looper, LooperConfig, Registrar, Subsystem, TelemetryTable, Topic,
};

#[test]
fn test_racing_writers_against_running_looper() {
    let binding = MockBinding::with_controllers(&[1]);
    let config = ClimberConfig::default().with_self_test(SelfTestTiming::instant());
    let climber = Climber::new(config, &binding).into_subsystem();

    let config = LooperConfig::new(2.0)
        .with_name("race")
        .with_overrun_warnings(false);
    let period = config.period().unwrap();
    let mut looper = Looper::new(config);
    looper.register(climber.loop_handle()).unwrap();

    let started = Instant::now();
    looper.start().unwrap();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let climber = climber.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    let wanted = WantedState::ALL[(i + t) % WantedState::ALL.len()];
                    climber.set_wanted_state(wanted);
                    let snapshot = climber.snapshot();
                    assert!(matches!(snapshot.wanted, Wanted::Known(_)));
                    let _ = climber.at_target();
                    if i % 50 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }

    climber.set_wanted_state(WantedState::Climb);
    thread::sleep(Duration::from_millis(20));
    looper.stop();

    let elapsed = started.elapsed();

    // Every tick lasts at least one period, and the writers must not starve
    // the looper of ticks
    let stats = looper.stats();
    let budget = (elapsed.as_secs_f64() / period.as_secs_f64()) as u64;
    assert!(stats.iterations <= budget + 1, "{} > {}", stats.iterations, budget);
    assert!(stats.iterations * 10 >= budget, "{} ticks in {:?}", stats.iterations, elapsed);
    assert_eq!(stats.callback_failures, 0);

    assert_eq!(climber.system_state(), SystemState::Climbing);
    assert!(climber.at_target());
    assert_eq!(climber.diagnostics().errors(), 0);

    // Each entry commands two or four actuators, never more
    let entries = climber.snapshot().entries as usize;
    let commands = binding.commands().len();
    assert!(entries > 0);
    assert!(commands >= entries * 2 && commands <= entries * 4);
}

#[test]
fn test_independent_subsystems_share_a_looper() {
    let first_binding = MockBinding::with_controllers(&[1]);
    let second_binding = MockBinding::with_controllers(&[]);
    let first = Climber::new(ClimberConfig::default(), &first_binding).into_subsystem();
    let second = Climber::new(ClimberConfig::default(), &second_binding).into_subsystem();

    let mut looper = Looper::new(LooperConfig::new(1.0).with_overrun_warnings(false));
    looper.register(first.loop_handle()).unwrap();
    looper.register(second.loop_handle()).unwrap();
    looper.start().unwrap();

    first.set_wanted_state(WantedState::Climb);
    second.set_wanted_state(WantedState::Climb);
    thread::sleep(Duration::from_millis(20));
    looper.stop();

    assert_eq!(first.system_state(), SystemState::Climbing);
    assert_eq!(second.system_state(), SystemState::Disabling);
    assert_eq!(first_binding.commands().len(), 4);
    assert!(second_binding.commands().is_empty());
}

#[test]
fn test_dashboard_mirrors_published_telemetry() {
    let binding = MockBinding::with_controllers(&[1]);
    let climber = Climber::new(ClimberConfig::default(), &binding).into_subsystem();
    let topic = Topic::<TelemetryEntry>::new("telemetry");
    let feed = topic.subscribe();

    let mut looper = Looper::new(LooperConfig::new(1.0).with_overrun_warnings(false));
    looper.register(climber.loop_handle()).unwrap();
    looper.start().unwrap();
    climber.set_wanted_state(WantedState::Climb);
    thread::sleep(Duration::from_millis(20));

    let publisher = {
        let climber = climber.clone();
        let topic = topic.clone();
        thread::spawn(move || climber.output_telemetry(&topic))
    };
    publisher.join().unwrap();
    looper.stop();

    let table = TelemetryTable::new();
    assert!(table.mirror(&feed) > 0);
    assert_eq!(table.text("Climber/State").as_deref(), Some("CLIMBING"));
    assert_eq!(table.text("Climber/WantedState").as_deref(), Some("CLIMB"));
    assert!(table.number("Climber/ClimbIRVoltage").is_some());
}
