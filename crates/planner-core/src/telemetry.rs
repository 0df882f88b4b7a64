//! Telemetry and debug tracing (spec §6 Configuration: `Telemetry`, `Debug`).
//!
//! Grounded on `tracer.rs`'s `VmTracer` trait: a zero-cost-by-monomorphization
//! trait the resolver and builder are generic over, rather than a dynamic
//! sink. `NoopTracer`'s methods are empty and inline away entirely; the
//! counting/timing tracers are thin enough that a real telemetry sink can be
//! layered on by wrapping one of them.

use std::time::Instant;

/// Hook points a `PlannerTracer` implementation may observe. Mirrors the
/// teacher's `TraceEvent` in spirit but scoped to this crate's phases
/// instead of VM opcodes.
#[derive(Debug, Clone)]
pub enum TraceEvent {
    WaveStarted { wave: usize },
    WaveFinished { wave: usize, progressed: bool },
    DecoratorBatch { path: String, calls: usize },
    BlockerEvaluated { taken: Option<bool> },
    LoopUnrolled { iterations: usize },
}

/// The planner's tracing trait. Implementations pay only for what they use;
/// `NoopTracer`'s empty bodies compile away under monomorphization exactly
/// like the teacher's `NoopTracer` (spec §6 "off: no allocation").
pub trait PlannerTracer {
    fn on_event(&mut self, event: TraceEvent);
    fn on_phase_enter(&mut self, _phase: &'static str) {}
    fn on_phase_exit(&mut self, _phase: &'static str) {}
}

/// `Telemetry::Off` (spec §6).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl PlannerTracer for NoopTracer {
    fn on_event(&mut self, _event: TraceEvent) {}
}

/// `Telemetry::Basic` — event/step/wave counts, no timings (spec §6).
#[derive(Debug, Default)]
pub struct CountingTracer {
    pub waves: usize,
    pub decorator_batches: usize,
    pub decorator_calls: usize,
    pub blockers_evaluated: usize,
    pub loop_iterations: usize,
}

impl PlannerTracer for CountingTracer {
    fn on_event(&mut self, event: TraceEvent) {
        match event {
            TraceEvent::WaveStarted { .. } => self.waves += 1,
            TraceEvent::DecoratorBatch { calls, .. } => {
                self.decorator_batches += 1;
                self.decorator_calls += calls;
            }
            TraceEvent::BlockerEvaluated { .. } => self.blockers_evaluated += 1,
            TraceEvent::LoopUnrolled { iterations } => self.loop_iterations += iterations,
            TraceEvent::WaveFinished { .. } => {}
        }
    }
}

/// `Telemetry::Timing` — per-phase durations in addition to counts (spec §6).
#[derive(Debug, Default)]
pub struct TimingTracer {
    pub counts: CountingTracer,
    pub phase_durations: std::collections::HashMap<&'static str, std::time::Duration>,
    phase_starts: std::collections::HashMap<&'static str, Instant>,
}

impl PlannerTracer for TimingTracer {
    fn on_event(&mut self, event: TraceEvent) {
        self.counts.on_event(event);
    }

    fn on_phase_enter(&mut self, phase: &'static str) {
        self.phase_starts.insert(phase, Instant::now());
    }

    fn on_phase_exit(&mut self, phase: &'static str) {
        if let Some(start) = self.phase_starts.remove(phase) {
            *self.phase_durations.entry(phase).or_default() += start.elapsed();
        }
    }
}

/// `Debug` axis (spec §6): off emits nothing, `Paths` logs enter/exit of
/// major routines, `Detailed` logs per-event traces too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DebugLevel {
    #[default]
    Off,
    Paths,
    Detailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_tracer_tallies_waves() {
        let mut tracer = CountingTracer::default();
        tracer.on_event(TraceEvent::WaveStarted { wave: 0 });
        tracer.on_event(TraceEvent::WaveStarted { wave: 1 });
        assert_eq!(tracer.waves, 2);
    }

    #[test]
    fn counting_tracer_sums_decorator_calls_across_batches() {
        let mut tracer = CountingTracer::default();
        tracer.on_event(TraceEvent::DecoratorBatch { path: "@env".into(), calls: 2 });
        tracer.on_event(TraceEvent::DecoratorBatch { path: "@retry".into(), calls: 1 });
        assert_eq!(tracer.decorator_batches, 2);
        assert_eq!(tracer.decorator_calls, 3);
    }

    #[test]
    fn timing_tracer_records_nonzero_duration() {
        let mut tracer = TimingTracer::default();
        tracer.on_phase_enter("resolve");
        std::thread::sleep(std::time::Duration::from_millis(1));
        tracer.on_phase_exit("resolve");
        assert!(tracer.phase_durations["resolve"] >= std::time::Duration::from_millis(1));
    }
}
