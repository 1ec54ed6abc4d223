//! Per-seam synchronization of list compilation, scanner positioning and
//! the welding start.
//!
//! Three worker threads, one per role, each parked on its own job slot.
//! The start-weld worker waits on the `ReadinessGate` until Z compensation,
//! list generation and the scanner move have all finished. Every arm and
//! reset of the gate starts a new generation; jobs carry the generation
//! they were posted for, so work of an abandoned seam never counts for the
//! next one.

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::ScannerConfig;
use crate::coords::Point;
use crate::error::{Error, Result};
use crate::figure::Figure;
use crate::figure_welding::{AbstractFigureWelding, MarkAbort, ScannerControl, WeldingData};

/// Progress of the readiness gate. The pending phases name the first
/// missing completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Idle,
    ZPending,
    ListPending,
    MovePending,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ZCompensation,
    ListGeneration,
    ContourPrepared,
    ScannerMove,
}

#[derive(Debug, Default)]
struct GateState {
    generation: u64,
    armed: bool,
    z_done: bool,
    list_done: bool,
    contour_prepared: bool,
    move_done: bool,
    cancelled: bool,
}

impl GateState {
    fn phase(&self) -> GatePhase {
        if !self.armed {
            GatePhase::Idle
        } else if !self.z_done {
            GatePhase::ZPending
        } else if !(self.list_done || self.contour_prepared) {
            GatePhase::ListPending
        } else if !self.move_done {
            GatePhase::MovePending
        } else {
            GatePhase::Ready
        }
    }

    fn ready(&self) -> bool {
        self.phase() == GatePhase::Ready
    }

    fn set_done(&mut self, phase: Phase) {
        match phase {
            Phase::ZCompensation => self.z_done = true,
            Phase::ListGeneration => self.list_done = true,
            Phase::ContourPrepared => self.contour_prepared = true,
            Phase::ScannerMove => self.move_done = true,
        }
    }

    /// Back to idle in a new generation
    fn restart(&mut self, armed: bool, contour_prepared: bool) -> u64 {
        *self = GateState {
            generation: self.generation.wrapping_add(1),
            armed,
            contour_prepared,
            cancelled: self.cancelled,
            ..GateState::default()
        };
        self.generation
    }
}

/// Start condition of one seam. All flags live under one mutex so a
/// completion is seen by the waiter that is notified for it.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl ReadinessGate {
    pub fn new() -> ReadinessGate {
        ReadinessGate::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new seam and returns its generation. With
    /// `contour_already_prepared` the list of an earlier seam counts as
    /// generated.
    pub fn arm(&self, contour_already_prepared: bool) -> u64 {
        let generation = self.lock().restart(true, contour_already_prepared);
        self.changed.notify_all();
        generation
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Completes a phase of the current generation
    pub fn complete(&self, phase: Phase) {
        let mut state = self.lock();
        state.set_done(phase);
        debug!(completed = ?phase, phase = ?state.phase(), "readiness gate");
        self.changed.notify_all();
    }

    /// Completes a phase only if the gate is still in `generation`
    pub fn complete_in(&self, generation: u64, phase: Phase) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            debug!(completed = ?phase, generation, current = state.generation,
                   "stale completion ignored");
            return false;
        }
        state.set_done(phase);
        debug!(completed = ?phase, phase = ?state.phase(), "readiness gate");
        self.changed.notify_all();
        true
    }

    /// Disarms the gate, a waiter returns `GateAborted`
    pub fn reset(&self) {
        self.lock().restart(false, false);
        self.changed.notify_all();
    }

    /// Resets the gate unless a newer seam has armed it already
    pub fn reset_in(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation {
            state.restart(false, false);
            self.changed.notify_all();
        }
    }

    pub fn phase(&self) -> GatePhase {
        self.lock().phase()
    }

    pub fn is_start_welding_ready(&self) -> bool {
        self.lock().ready()
    }

    /// Blocks until the gate of `generation` is ready. Any arm or reset in
    /// between ends the wait with `GateAborted`.
    pub fn wait_ready(&self, generation: u64, timeout: Duration) -> Result<()> {
        let state = self.lock();
        let (state, result) = self
            .changed
            .wait_timeout_while(state, timeout, |s| {
                !s.cancelled && s.armed && s.generation == generation && !s.ready()
            })
            .unwrap_or_else(PoisonError::into_inner);
        if state.cancelled {
            return Err(Error::ShuttingDown);
        }
        if state.generation != generation {
            return Err(Error::GateAborted);
        }
        if state.ready() {
            return Ok(());
        }
        if result.timed_out() {
            return Err(Error::GateTimeout {
                waited: timeout,
                phase: state.phase(),
            });
        }
        Err(Error::GateAborted)
    }

    pub fn cancel(&self) {
        self.lock().cancelled = true;
        self.changed.notify_all();
    }
}

struct SlotState<T> {
    job: Option<T>,
    teardown: bool,
}

/// Single job mailbox of one worker thread
struct WorkerSlot<T> {
    state: Mutex<SlotState<T>>,
    wake: Condvar,
}

impl<T> WorkerSlot<T> {
    fn new() -> WorkerSlot<T> {
        WorkerSlot {
            state: Mutex::new(SlotState { job: None, teardown: false }),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post(&self, job: T) {
        self.lock().job = Some(job);
        self.wake.notify_one();
    }

    /// Next job, or `None` once the slot is torn down
    fn wait(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.teardown {
                return None;
            }
            if let Some(job) = state.job.take() {
                return Some(job);
            }
            state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn teardown(&self) {
        self.lock().teardown = true;
        self.wake.notify_all();
    }
}

/// A weld list compiler that can also drive the scanner
pub trait WeldScanner: AbstractFigureWelding + ScannerControl + Send {}

impl<T: AbstractFigureWelding + ScannerControl + Send> WeldScanner for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Weld,
    Preview,
}

#[derive(Debug, Clone)]
pub struct SeamRequest {
    pub kind: RequestKind,
    pub data: WeldingData,
    pub weld_figure: Figure,
    pub wobble_figure_file: Option<PathBuf>,
    /// The list built during an earlier seam is executed again
    pub contour_already_prepared: bool,
}

#[derive(Debug)]
pub enum WeldEvent {
    ListBuilt { seam: u32 },
    ScannerMoved { seam: u32 },
    WeldingStarted { seam: u32 },
    Fatal { seam: u32, error: Error },
}

struct ListJob {
    generation: u64,
    kind: RequestKind,
    data: WeldingData,
    weld_figure: Figure,
    wobble_figure_file: Option<PathBuf>,
}

struct MoveJob {
    generation: u64,
    seam: u32,
    target: Point,
}

struct StartJob {
    generation: u64,
    seam: u32,
}

struct Shared {
    scanner: Mutex<Box<dyn WeldScanner>>,
    abort: Arc<dyn MarkAbort>,
    gate: ReadinessGate,
    list_fill: WorkerSlot<ListJob>,
    scanner_move: WorkerSlot<MoveJob>,
    start_weld: WorkerSlot<StartJob>,
    requested: Mutex<Option<u32>>,
    gate_timeout: Duration,
}

impl Shared {
    fn scanner(&self) -> MutexGuard<'_, Box<dyn WeldScanner>> {
        self.scanner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn requested(&self) -> MutexGuard<'_, Option<u32>> {
        self.requested.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn publish(events: &Sender<WeldEvent>, event: WeldEvent) {
    if events.send(event).is_err() {
        debug!("weld event receiver dropped");
    }
}

fn fill_list(scanner: &mut dyn WeldScanner, job: ListJob) -> Result<()> {
    match job.kind {
        RequestKind::Weld => {
            scanner.prepare_welding_list(&job.data, job.weld_figure)?;
            if let Some(path) = &job.wobble_figure_file {
                if let Err(e) = scanner.load_wobble_figure_file(path) {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    warn!(seam = job.data.seam, error = %e, "continuing without wobble figure");
                }
            }
            scanner.build_welding_list()
        }
        RequestKind::Preview => {
            if let Some(path) = &job.wobble_figure_file {
                if let Err(e) = scanner.load_wobble_figure_file(path) {
                    warn!(seam = job.data.seam, error = %e, "preview without wobble figure");
                }
            }
            scanner.build_preview_list(&job.data, job.weld_figure)
        }
    }
}

fn list_fill_loop(shared: Arc<Shared>, events: Sender<WeldEvent>) {
    while let Some(job) = shared.list_fill.wait() {
        let (seam, generation) = (job.data.seam, job.generation);
        let result = fill_list(&mut **shared.scanner(), job);
        match result {
            Ok(()) => {
                shared.gate.complete_in(generation, Phase::ListGeneration);
                publish(&events, WeldEvent::ListBuilt { seam });
            }
            Err(e) => {
                error!(seam, error = %e, "weld list not built");
                shared.gate.reset_in(generation);
                publish(&events, WeldEvent::Fatal { seam, error: e });
            }
        }
    }
    debug!("list-fill worker finished");
}

fn scanner_move_loop(shared: Arc<Shared>, events: Sender<WeldEvent>) {
    while let Some(job) = shared.scanner_move.wait() {
        let MoveJob { generation, seam, target } = job;
        let result = shared.scanner().move_to(target.x, target.y);
        match result {
            Ok(()) => {
                shared.gate.complete_in(generation, Phase::ScannerMove);
                publish(&events, WeldEvent::ScannerMoved { seam });
            }
            Err(e) => {
                error!(seam, error = %e, "scanner move failed");
                shared.gate.reset_in(generation);
                publish(&events, WeldEvent::Fatal { seam, error: e });
            }
        }
    }
    debug!("scanner-move worker finished");
}

fn start_weld_loop(shared: Arc<Shared>, events: Sender<WeldEvent>) {
    while let Some(StartJob { generation, seam }) = shared.start_weld.wait() {
        let result = shared.gate.wait_ready(generation, shared.gate_timeout).and_then(|()| {
            shared.scanner().start_mark()
        });
        match result {
            Ok(()) => publish(&events, WeldEvent::WeldingStarted { seam }),
            Err(Error::ShuttingDown) => break,
            Err(Error::GateAborted) => debug!(seam, "start welding abandoned"),
            Err(e) => {
                error!(seam, error = %e, "welding not started");
                publish(&events, WeldEvent::Fatal { seam, error: e });
            }
        }
    }
    debug!("start-weld worker finished");
}

fn spawn_worker<F>(name: &'static str, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| Error::Spawn { name, source })
}

pub struct Orchestrator {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(scanner: Box<dyn WeldScanner>, config: &ScannerConfig)
               -> Result<(Orchestrator, Receiver<WeldEvent>)> {
        let abort = scanner.abort_handle();
        let shared = Arc::new(Shared {
            scanner: Mutex::new(scanner),
            abort,
            gate: ReadinessGate::new(),
            list_fill: WorkerSlot::new(),
            scanner_move: WorkerSlot::new(),
            start_weld: WorkerSlot::new(),
            requested: Mutex::new(None),
            gate_timeout: Duration::from_millis(config.gate_timeout_ms),
        });
        let (tx, rx) = channel();
        let mut orchestrator = Orchestrator {
            shared: shared.clone(),
            workers: Vec::with_capacity(3),
        };

        let (s, e) = (shared.clone(), tx.clone());
        orchestrator.workers.push(spawn_worker("list-fill", move || list_fill_loop(s, e))?);
        let (s, e) = (shared.clone(), tx.clone());
        orchestrator.workers.push(spawn_worker("scanner-move", move || scanner_move_loop(s, e))?);
        orchestrator.workers.push(spawn_worker("start-weld", move || start_weld_loop(shared, tx))?);
        Ok((orchestrator, rx))
    }

    pub fn seam_start(&self, seam: u32) {
        info!(seam, "seam start");
        self.clear_seam();
    }

    pub fn seam_end(&self) {
        info!("seam end");
        self.clear_seam();
    }

    fn clear_seam(&self) {
        self.shared.gate.reset();
        let mut scanner = self.shared.scanner();
        scanner.reset_seam();
        *self.shared.requested() = None;
    }

    /// Accepts one weld or preview request per seam and hands it to the
    /// workers. A second request is rejected without touching any state.
    pub fn request(&self, request: SeamRequest) -> Result<()> {
        let seam = request.data.seam;
        let first = match request.weld_figure.figure.first() {
            Some(first) => first.position(),
            None => return Err(Error::NoWeldFigure),
        };
        {
            let mut requested = self.shared.requested();
            if let Some(in_flight) = *requested {
                warn!(seam, in_flight, "welding request rejected, one is already in flight");
                return Err(Error::SeamAlreadyRequested(in_flight));
            }
            *requested = Some(seam);
        }

        let generation = self.shared.gate.arm(request.contour_already_prepared);
        if request.kind == RequestKind::Preview {
            // no height compensation for a preview
            self.shared.gate.complete_in(generation, Phase::ZCompensation);
        }
        if !request.contour_already_prepared {
            self.shared.list_fill.post(ListJob {
                generation,
                kind: request.kind,
                data: request.data.clone(),
                weld_figure: request.weld_figure,
                wobble_figure_file: request.wobble_figure_file,
            });
        }
        self.shared.scanner_move.post(MoveJob {
            generation,
            seam,
            target: first + Point::from(request.data.offset),
        });
        self.shared.start_weld.post(StartJob { generation, seam });
        info!(seam, kind = ?request.kind, prepared = request.contour_already_prepared,
              "seam requested");
        Ok(())
    }

    pub fn z_compensation_done(&self) {
        self.shared.gate.complete(Phase::ZCompensation);
    }

    pub fn gate_phase(&self) -> GatePhase {
        self.shared.gate.phase()
    }

    pub fn is_start_welding_ready(&self) -> bool {
        self.shared.gate.is_start_welding_ready()
    }

    /// Immediate hardware abort. Goes through the backend's abort handle,
    /// so a worker busy on the scanner does not delay it.
    pub fn stop_mark(&self) -> Result<()> {
        self.shared.gate.reset();
        self.shared.abort.abort()
    }

    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.list_fill.teardown();
        self.shared.scanner_move.teardown();
        self.shared.start_weld.teardown();
        self.shared.gate.cancel();
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                error!(worker = %name, "worker panicked");
            }
        }
        info!("orchestrator stopped");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
