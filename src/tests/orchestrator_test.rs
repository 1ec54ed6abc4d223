use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ScannerConfig;
use crate::error::{Error, Result};
use crate::figure::{Figure, Order};
use crate::figure_welding::{WeldingData, WobbleError, WobbleMode};
use crate::orchestrator::{
    GatePhase, Orchestrator, Phase, ReadinessGate, RequestKind, SeamRequest, WeldEvent,
    WeldScanner,
};
use crate::rtc6::driver::{RecordingDriver, Rtc6Call, Rtc6Control, Rtc6Driver};
use crate::rtc6::figure_welding::FigureWelding;
use crate::smart_move::figure_welding::FigureWelding as SmartMoveFigureWelding;
use crate::smart_move::transport::{RecordingTransport, Transport};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

fn config(gate_timeout_ms: u64) -> ScannerConfig {
    ScannerConfig {
        gate_timeout_ms,
        ..ScannerConfig::default()
    }
}

fn orchestrator(gate_timeout_ms: u64) -> (Orchestrator, Receiver<WeldEvent>) {
    let config = config(gate_timeout_ms);
    let scanner = FigureWelding::new(config.clone(), RecordingDriver::new());
    Orchestrator::new(Box::new(scanner), &config).unwrap()
}

fn orchestrator_with(scanner: Box<dyn WeldScanner>) -> (Orchestrator, Receiver<WeldEvent>) {
    Orchestrator::new(scanner, &config(5000)).unwrap()
}

/// Recording driver whose list writes take `delay`
struct SlowDriver {
    recording: RecordingDriver,
    delay: Duration,
}

impl Rtc6Driver for SlowDriver {
    fn load_list(&mut self, list: u32, position: u32) -> bool {
        thread::sleep(self.delay);
        self.recording.load_list(list, position)
    }

    fn set_end_of_list(&mut self) {
        self.recording.set_end_of_list()
    }

    fn execute_list(&mut self, list: u32) {
        self.recording.execute_list(list)
    }

    fn jump_abs(&mut self, x: i32, y: i32) {
        self.recording.jump_abs(x, y)
    }

    fn mark_abs(&mut self, x: i32, y: i32) {
        self.recording.mark_abs(x, y)
    }

    fn set_laser_power(&mut self, port: u32, value: u32) {
        self.recording.set_laser_power(port, value)
    }

    fn set_mark_speed(&mut self, speed: f64) {
        self.recording.set_mark_speed(speed)
    }

    fn set_jump_speed(&mut self, speed: f64) {
        self.recording.set_jump_speed(speed)
    }

    fn set_wobbel_mode(&mut self, transversal: u32, longitudinal: u32, frequency: f64, mode: i32) {
        self.recording.set_wobbel_mode(transversal, longitudinal, frequency, mode)
    }

    fn set_wobbel_vector(&mut self, d_trans: f64, d_long: f64, period: u32,
                         d_power: f64, d_ring_power: f64) {
        self.recording.set_wobbel_vector(d_trans, d_long, period, d_power, d_ring_power)
    }

    fn goto_xy(&mut self, x: i32, y: i32) {
        self.recording.goto_xy(x, y)
    }

    fn busy(&self) -> bool {
        self.recording.busy()
    }

    fn control(&self) -> Arc<dyn Rtc6Control> {
        self.recording.control()
    }
}

/// Recording transport that refuses every alignment
struct AlignRefused(RecordingTransport);

impl Transport for AlignRefused {
    fn request(&mut self, command: &str) -> Result<String> {
        if command.contains("ALIGN_X") {
            return Ok("ERR 12".to_string());
        }
        self.0.request(command)
    }

    fn send_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.0.send_file(name, data)
    }
}

fn request(seam: u32) -> SeamRequest {
    SeamRequest {
        kind: RequestKind::Weld,
        data: WeldingData {
            seam,
            laser_power: 0.5,
            ..WeldingData::default()
        },
        weld_figure: Figure::new(vec![
            Order::new(1.0, 0.0, 0.5, 0.0, -1.0),
            Order::new(2.0, 0.0, 0.5, 0.0, -1.0),
        ]),
        wobble_figure_file: None,
        contour_already_prepared: false,
    }
}

fn prepared(seam: u32) -> SeamRequest {
    SeamRequest {
        contour_already_prepared: true,
        ..request(seam)
    }
}

/// Events up to and including the first one `last` accepts
fn events_until(rx: &Receiver<WeldEvent>, last: impl Fn(&WeldEvent) -> bool) -> Vec<WeldEvent> {
    let mut events = Vec::new();
    loop {
        let event = rx.recv_timeout(EVENT_TIMEOUT).unwrap();
        let done = last(&event);
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Everything published until the channel stays silent for `QUIET`
fn remaining_events(rx: &Receiver<WeldEvent>) -> Vec<WeldEvent> {
    let mut events = Vec::new();
    loop {
        match rx.recv_timeout(QUIET) {
            Ok(event) => events.push(event),
            Err(_) => return events,
        }
    }
}

fn started(events: &[WeldEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            WeldEvent::WeldingStarted { seam } => Some(*seam),
            _ => None,
        })
        .collect()
}

#[test]
fn gate_phases() {
    let gate = ReadinessGate::new();
    assert_eq!(gate.phase(), GatePhase::Idle);
    gate.arm(false);
    assert_eq!(gate.phase(), GatePhase::ZPending);
    gate.complete(Phase::ZCompensation);
    gate.complete(Phase::ScannerMove);
    assert_eq!(gate.phase(), GatePhase::ListPending);
    assert!(!gate.is_start_welding_ready());
    gate.complete(Phase::ListGeneration);
    assert!(gate.is_start_welding_ready());
    gate.reset();
    assert_eq!(gate.phase(), GatePhase::Idle);

    gate.arm(true);
    gate.complete(Phase::ZCompensation);
    assert_eq!(gate.phase(), GatePhase::MovePending);
    gate.complete(Phase::ScannerMove);
    assert_eq!(gate.phase(), GatePhase::Ready);
}

#[test]
fn gate_times_out() {
    let gate = ReadinessGate::new();
    let generation = gate.arm(false);
    gate.complete(Phase::ZCompensation);
    match gate.wait_ready(generation, Duration::from_millis(20)) {
        Err(Error::GateTimeout { phase: GatePhase::ListPending, .. }) => {}
        other => panic!("unexpected {:?}", other),
    }
    let timeout = gate.wait_ready(generation, Duration::from_millis(20));
    assert!(matches!(timeout, Err(ref e) if e.is_fatal()));
}

#[test]
fn gate_blocks_until_ready() {
    let gate = Arc::new(ReadinessGate::new());
    let generation = gate.arm(false);
    gate.complete(Phase::ZCompensation);
    let g = gate.clone();
    let completer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        g.complete(Phase::ListGeneration);
        thread::sleep(Duration::from_millis(20));
        g.complete(Phase::ScannerMove);
    });
    gate.wait_ready(generation, EVENT_TIMEOUT).unwrap();
    assert!(gate.is_start_welding_ready());
    completer.join().unwrap();
}

#[test]
fn gate_released_by_reset_and_cancel() {
    let gate = ReadinessGate::new();
    assert!(matches!(gate.wait_ready(gate.generation(), EVENT_TIMEOUT), Err(Error::GateAborted)));
    let generation = gate.arm(false);
    gate.reset();
    assert!(matches!(gate.wait_ready(generation, EVENT_TIMEOUT), Err(Error::GateAborted)));
    let generation = gate.arm(false);
    gate.cancel();
    assert!(matches!(gate.wait_ready(generation, EVENT_TIMEOUT), Err(Error::ShuttingDown)));
}

#[test]
fn gate_waiter_of_abandoned_seam_aborts() {
    let gate = Arc::new(ReadinessGate::new());
    let first = gate.arm(true);
    let g = gate.clone();
    let waiter = thread::spawn(move || g.wait_ready(first, EVENT_TIMEOUT));
    thread::sleep(Duration::from_millis(20));

    // the next seam is armed and ready before the old waiter runs again
    gate.reset();
    let second = gate.arm(true);
    assert_ne!(first, second);
    gate.complete(Phase::ZCompensation);
    gate.complete(Phase::ScannerMove);
    assert!(gate.is_start_welding_ready());

    assert!(matches!(waiter.join().unwrap(), Err(Error::GateAborted)));
    gate.wait_ready(second, EVENT_TIMEOUT).unwrap();
}

#[test]
fn gate_ignores_completions_of_old_generation() {
    let gate = ReadinessGate::new();
    let first = gate.arm(false);
    let second = gate.arm(false);
    gate.complete(Phase::ZCompensation);
    assert!(!gate.complete_in(first, Phase::ListGeneration));
    assert!(!gate.complete_in(first, Phase::ScannerMove));
    assert_eq!(gate.phase(), GatePhase::ListPending);

    // a failure of the old seam leaves the new one armed
    gate.reset_in(first);
    assert_eq!(gate.phase(), GatePhase::ListPending);
    assert!(gate.complete_in(second, Phase::ListGeneration));
    assert_eq!(gate.phase(), GatePhase::MovePending);
    gate.reset_in(second);
    assert_eq!(gate.phase(), GatePhase::Idle);
}

#[test]
fn full_seam_starts_welding() {
    let (orchestrator, rx) = orchestrator(5000);
    orchestrator.seam_start(1);
    orchestrator.request(request(1)).unwrap();
    orchestrator.z_compensation_done();
    let events = events_until(&rx, |e| {
        matches!(e, WeldEvent::WeldingStarted { .. } | WeldEvent::Fatal { .. })
    });
    assert!(events.iter().any(|e| matches!(e, WeldEvent::ListBuilt { seam: 1 })));
    assert!(events.iter().any(|e| matches!(e, WeldEvent::ScannerMoved { seam: 1 })));
    assert!(matches!(events.last(), Some(WeldEvent::WeldingStarted { seam: 1 })));
    assert_eq!(orchestrator.gate_phase(), GatePhase::Ready);
    orchestrator.stop_mark().unwrap();
    orchestrator.seam_end();
    assert_eq!(orchestrator.gate_phase(), GatePhase::Idle);
}

#[test]
fn second_request_rejected() {
    let (orchestrator, _rx) = orchestrator(5000);
    orchestrator.seam_start(4);
    orchestrator.request(request(4)).unwrap();
    assert!(matches!(orchestrator.request(request(4)), Err(Error::SeamAlreadyRequested(4))));
    assert_ne!(orchestrator.gate_phase(), GatePhase::Idle);

    orchestrator.seam_end();
    orchestrator.seam_start(5);
    orchestrator.request(request(5)).unwrap();
}

#[test]
fn empty_figure_not_accepted() {
    let (orchestrator, _rx) = orchestrator(5000);
    let mut empty = request(2);
    empty.weld_figure = Figure::new(vec![]);
    assert!(matches!(orchestrator.request(empty), Err(Error::NoWeldFigure)));
    orchestrator.request(request(2)).unwrap();
}

#[test]
fn missing_z_compensation_times_out() {
    let (orchestrator, rx) = orchestrator(50);
    orchestrator.seam_start(6);
    orchestrator.request(request(6)).unwrap();
    let events = events_until(&rx, |e| {
        matches!(e, WeldEvent::WeldingStarted { .. } | WeldEvent::Fatal { .. })
    });
    match events.last() {
        Some(WeldEvent::Fatal { seam: 6, error: Error::GateTimeout { phase, .. } }) => {
            assert_eq!(*phase, GatePhase::ZPending)
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn preview_needs_no_z_compensation() {
    let (orchestrator, rx) = orchestrator(5000);
    let mut preview = request(8);
    preview.kind = RequestKind::Preview;
    orchestrator.request(preview).unwrap();
    let events = events_until(&rx, |e| {
        matches!(e, WeldEvent::WeldingStarted { .. } | WeldEvent::Fatal { .. })
    });
    assert!(matches!(events.last(), Some(WeldEvent::WeldingStarted { seam: 8 })));
}

#[test]
fn prepared_contour_skips_list_generation() {
    let (orchestrator, rx) = orchestrator(5000);
    let mut prepared = request(9);
    prepared.contour_already_prepared = true;
    orchestrator.request(prepared).unwrap();
    orchestrator.z_compensation_done();
    let events = events_until(&rx, |e| {
        matches!(e, WeldEvent::WeldingStarted { .. } | WeldEvent::Fatal { .. })
    });
    assert!(!events.iter().any(|e| matches!(e, WeldEvent::ListBuilt { .. })));
    assert!(matches!(events.last(), Some(WeldEvent::WeldingStarted { seam: 9 })));
}

#[test]
fn abandoned_seam_never_starts() {
    let (orchestrator, rx) = orchestrator(5000);
    for round in 0..20 {
        let (first, second) = (round * 2 + 1, round * 2 + 2);
        orchestrator.seam_start(first);
        orchestrator.request(prepared(first)).unwrap();
        thread::sleep(Duration::from_millis(20));
        orchestrator.seam_end();

        orchestrator.seam_start(second);
        orchestrator.request(prepared(second)).unwrap();
        orchestrator.z_compensation_done();
        let events = events_until(&rx, |e| {
            matches!(e, WeldEvent::WeldingStarted { seam } if *seam == second)
                || matches!(e, WeldEvent::Fatal { .. })
        });
        assert_eq!(started(&events), vec![second], "round {}", round);
        orchestrator.seam_end();
    }
    assert!(started(&remaining_events(&rx)).is_empty());
}

#[test]
fn failed_list_fill_resets_gate() {
    let path = std::env::temp_dir().join("weld_scanner_orchestrator_wobble.json");
    std::fs::write(
        &path,
        r#"{"Name": "triangle", "ID": 2, "Description": "",
            "Figure": [{"EndPosition": [0.0, 0.0], "Power": 0.0},
                       {"EndPosition": [0.1, 0.0], "Power": 0.1},
                       {"EndPosition": [0.1, 0.1], "Power": -0.1},
                       {"EndPosition": [0.0, 0.0], "Power": 0.0}]}"#,
    )
    .unwrap();
    let (orchestrator, rx) = orchestrator(5000);
    let mut free = request(3);
    free.data.wobble_mode = WobbleMode::Free;
    free.data.laser_power = 0.0;
    free.wobble_figure_file = Some(path);
    orchestrator.seam_start(3);
    orchestrator.request(free).unwrap();
    orchestrator.z_compensation_done();

    let events = events_until(&rx, |e| matches!(e, WeldEvent::Fatal { .. }));
    match events.last() {
        Some(WeldEvent::Fatal { seam: 3, error }) => {
            assert!(matches!(error, Error::Wobble(WobbleError::NominalPowerWrong)));
            assert!(error.is_fatal());
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(started(&remaining_events(&rx)).is_empty());
    assert_eq!(orchestrator.gate_phase(), GatePhase::Idle);
    assert!(!orchestrator.is_start_welding_ready());
}

#[test]
fn failed_move_resets_gate() {
    let scanner = SmartMoveFigureWelding::new(config(5000), AlignRefused(RecordingTransport::new()));
    let (orchestrator, rx) = orchestrator_with(Box::new(scanner));
    orchestrator.seam_start(5);
    orchestrator.request(request(5)).unwrap();
    orchestrator.z_compensation_done();

    let events = events_until(&rx, |e| matches!(e, WeldEvent::Fatal { .. }));
    match events.last() {
        Some(WeldEvent::Fatal { seam: 5, error: Error::UnexpectedReply { reply, .. } }) => {
            assert_eq!(reply, "ERR 12")
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(started(&events).is_empty());
    assert!(started(&remaining_events(&rx)).is_empty());
    assert_eq!(orchestrator.gate_phase(), GatePhase::Idle);
}

#[test]
fn stop_mark_does_not_wait_for_list_fill() {
    let recording = RecordingDriver::new();
    let driver = SlowDriver {
        recording: recording.clone(),
        delay: Duration::from_millis(600),
    };
    let (orchestrator, rx) = orchestrator_with(Box::new(FigureWelding::new(config(5000), driver)));
    orchestrator.seam_start(1);
    orchestrator.request(request(1)).unwrap();
    orchestrator.z_compensation_done();
    thread::sleep(Duration::from_millis(50));

    let stopping = Instant::now();
    orchestrator.stop_mark().unwrap();
    let took = stopping.elapsed();
    assert!(took < Duration::from_millis(100), "stop_mark took {:?}", took);
    assert!(recording.calls().contains(&Rtc6Call::StopExecution));
    assert_eq!(orchestrator.gate_phase(), GatePhase::Idle);

    // the list of the stopped seam still completes, but nothing starts
    let events = events_until(&rx, |e| {
        matches!(e, WeldEvent::ListBuilt { .. } | WeldEvent::Fatal { .. })
    });
    assert!(matches!(events.last(), Some(WeldEvent::ListBuilt { seam: 1 })));
    assert!(started(&remaining_events(&rx)).is_empty());
    assert_eq!(recording.count(|c| matches!(c, Rtc6Call::ExecuteList(_))), 0);
    assert_eq!(orchestrator.gate_phase(), GatePhase::Idle);
}
