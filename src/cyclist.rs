//! The transport: maps cycle time onto wall-clock time and feeds a sink.
//!
//! A [`Cyclist`] does no waiting of its own. Whoever drives it (the threaded
//! driver in [`crate::scheduler`], an audio callback, a test) calls
//! [`Cyclist::tick`] with the current time, and the cyclist queries the
//! active pattern over the window between the end of the previous query and
//! `now + lookahead`. Consecutive windows share their boundary exactly, so
//! every event is delivered once, possibly as several fragments.
//!
//! New patterns arrive through a [`PatternSlot`], which any thread may write.
//! A tick picks the pending pattern up at the start of its window.

use crate::error::{Result, SinkError};
use crate::fraction::Fraction;
use crate::hap::Hap;
use crate::mini::mini;
use crate::pattern::Pattern;
use crate::scheduler::{check_cps, check_lookahead, ScheduledEvent, SchedulerConfig, SwapMode};
use crate::state::State;
use crate::timespan::TimeSpan;
use crate::value::Value;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{Sender, TrySendError};
use log::{debug, error, info, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================
// Clocks
// ============================================

/// A monotonic source of wall-clock time in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// Seconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to, with microsecond resolution.
///
/// Hosts that count audio samples can advance it from the audio callback.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock::default()
    }

    pub fn at(secs: f64) -> Self {
        let clock = ManualClock::new();
        clock.set(secs);
        clock
    }

    pub fn set(&self, secs: f64) {
        self.micros.store(to_micros(secs), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.micros.fetch_add(to_micros(secs), Ordering::SeqCst);
    }
}

fn to_micros(secs: f64) -> u64 {
    (secs.max(0.0) * 1_000_000.0).round() as u64
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.micros.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
}

// ============================================
// Pattern slot
// ============================================

/// The one piece of state shared between control code and the transport.
///
/// Writing replaces the pending pattern atomically. A reader sees either
/// the previous pattern or the new one in full.
pub struct PatternSlot<T> {
    pending: Arc<ArcSwapOption<Pattern<T>>>,
}

impl<T> Clone for PatternSlot<T> {
    fn clone(&self) -> Self {
        PatternSlot {
            pending: self.pending.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> PatternSlot<T> {
    pub fn new() -> Self {
        PatternSlot {
            pending: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Queue `pattern` for the next tick. A later write before that tick wins.
    pub fn set(&self, pattern: Pattern<T>) {
        self.pending.store(Some(Arc::new(pattern)));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load().is_some()
    }

    /// Take the pending pattern, leaving the slot empty.
    pub fn take(&self) -> Option<Pattern<T>> {
        self.pending.swap(None).map(|p| (*p).clone())
    }
}

impl<T: Clone + Send + Sync + 'static> Default for PatternSlot<T> {
    fn default() -> Self {
        PatternSlot::new()
    }
}

impl PatternSlot<Value> {
    /// Compile notation and queue it. On error nothing is queued and the
    /// current pattern keeps playing.
    pub fn set_notation(&self, src: &str) -> Result<()> {
        match mini(src) {
            Ok(pattern) => {
                self.set(pattern);
                Ok(())
            }
            Err(e) => {
                warn!("rejected notation: {}", e);
                Err(e)
            }
        }
    }
}

// ============================================
// Sinks
// ============================================

/// Receives scheduled events. Must not block.
pub trait Sink<T> {
    fn deliver(&mut self, event: ScheduledEvent<T>) -> Result<(), SinkError>;
}

impl<T, F> Sink<T> for F
where
    F: FnMut(ScheduledEvent<T>) -> Result<(), SinkError>,
{
    fn deliver(&mut self, event: ScheduledEvent<T>) -> Result<(), SinkError> {
        self(event)
    }
}

/// Forwards events into a crossbeam channel without waiting for space.
pub struct ChannelSink<T> {
    sender: Sender<ScheduledEvent<T>>,
}

impl<T> ChannelSink<T> {
    pub fn new(sender: Sender<ScheduledEvent<T>>) -> Self {
        ChannelSink { sender }
    }
}

impl<T> Sink<T> for ChannelSink<T> {
    fn deliver(&mut self, event: ScheduledEvent<T>) -> Result<(), SinkError> {
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Disconnected(_) => SinkError::Disconnected,
        })
    }
}

// ============================================
// Transport
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stopped,
    Running,
    Paused,
}

/// Enough transport state to compute the cycle position from outside.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSnapshot {
    pub transport: Transport,
    /// Wall time of cycle 0 at the current tempo.
    pub origin: f64,
    pub cps: f64,
    pub paused_at: Fraction,
}

impl TransportSnapshot {
    pub fn cycle_position(&self, now: f64) -> Fraction {
        match self.transport {
            Transport::Running => Fraction::from((now - self.origin) * self.cps),
            Transport::Paused => self.paused_at.clone(),
            Transport::Stopped => Fraction::zero(),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// The queried window in cycles, if anything was queried.
    pub window: Option<TimeSpan>,
    pub delivered: usize,
    pub failed: usize,
    /// A new pattern became active during this tick.
    pub swapped: bool,
    pub overrun: bool,
    pub query_time: Duration,
}

pub struct Cyclist<T> {
    config: SchedulerConfig,
    slot: PatternSlot<T>,
    active: Option<Pattern<T>>,
    /// A pattern waiting for its cycle boundary under `SwapMode::NextCycle`.
    deferred: Option<(Pattern<T>, Fraction)>,
    transport: Transport,
    origin: f64,
    last_end: Fraction,
    paused_at: Fraction,
    overruns: u32,
    degraded: bool,
}

impl<T: Clone + Send + Sync + 'static> Cyclist<T> {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Cyclist {
            config,
            slot: PatternSlot::new(),
            active: None,
            deferred: None,
            transport: Transport::Stopped,
            origin: 0.0,
            last_end: Fraction::zero(),
            paused_at: Fraction::zero(),
            overruns: 0,
            degraded: false,
        })
    }

    /// A cyclist that starts out with `pattern` active.
    pub fn with_pattern(config: SchedulerConfig, pattern: Pattern<T>) -> Result<Self> {
        let mut cyclist = Cyclist::new(config)?;
        cyclist.active = Some(pattern);
        Ok(cyclist)
    }

    /// A handle for writing new patterns from another thread.
    pub fn slot(&self) -> PatternSlot<T> {
        self.slot.clone()
    }

    pub fn set_pattern(&self, pattern: Pattern<T>) {
        self.slot.set(pattern);
    }

    pub fn active_pattern(&self) -> Option<&Pattern<T>> {
        self.active.as_ref()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> Transport {
        self.transport
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn cps(&self) -> f64 {
        self.config.cps
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            transport: self.transport,
            origin: self.origin,
            cps: self.config.cps,
            paused_at: self.paused_at.clone(),
        }
    }

    pub fn cycle_position(&self, now: f64) -> Fraction {
        self.snapshot().cycle_position(now)
    }

    /// Start from cycle 0, or resume where a pause left off.
    pub fn start(&mut self, now: f64) {
        match self.transport {
            Transport::Running => {}
            Transport::Stopped => {
                self.origin = now;
                self.last_end = Fraction::zero();
                self.transport = Transport::Running;
                info!("transport started at {:.3}s, {} cps", now, self.config.cps);
            }
            Transport::Paused => {
                self.origin = now - self.paused_at.to_f64() / self.config.cps;
                self.transport = Transport::Running;
                info!("transport resumed at cycle {}", self.paused_at);
            }
        }
    }

    /// Freeze the cycle position. Windows already handed out stay handed out.
    pub fn pause(&mut self, now: f64) {
        if self.transport != Transport::Running {
            return;
        }
        self.paused_at = self.cycle_position(now);
        self.transport = Transport::Paused;
        info!("transport paused at cycle {}", self.paused_at);
    }

    /// Stop; the next start begins again at cycle 0.
    pub fn stop(&mut self) {
        if self.transport == Transport::Stopped {
            return;
        }
        if let Some((pattern, _)) = self.deferred.take() {
            self.active = Some(pattern);
        }
        self.transport = Transport::Stopped;
        self.last_end = Fraction::zero();
        self.paused_at = Fraction::zero();
        self.overruns = 0;
        self.degraded = false;
        info!("transport stopped");
    }

    /// Change tempo without a jump in cycle position.
    pub fn set_tempo(&mut self, cps: f64, now: f64) -> Result<()> {
        check_cps(cps)?;
        if self.transport == Transport::Running {
            let position = (now - self.origin) * self.config.cps;
            self.origin = now - position / cps;
        }
        debug!("tempo {} -> {} cps", self.config.cps, cps);
        self.config.cps = cps;
        Ok(())
    }

    pub fn set_lookahead(&mut self, secs: f64) -> Result<()> {
        check_lookahead(secs)?;
        debug!("lookahead {}s -> {}s", self.config.lookahead, secs);
        self.config.lookahead = secs;
        Ok(())
    }

    /// Query the next window and deliver its events, ordered by onset time.
    ///
    /// Does nothing unless running. A sink error is logged and counted, and
    /// delivery carries on with the next event.
    pub fn tick<S>(&mut self, now: f64, sink: &mut S) -> TickReport
    where
        S: Sink<T> + ?Sized,
    {
        let mut report = TickReport::default();
        if self.transport != Transport::Running {
            return report;
        }

        self.promote_pending(&mut report);

        let begin = self.last_end.clone();
        let end = Fraction::from((now - self.origin + self.config.lookahead) * self.config.cps);
        if end <= begin {
            return report;
        }
        let window = TimeSpan::new(begin, end.clone());
        trace!("tick window {}", window);

        let started = Instant::now();
        let mut haps = self.query_window(&window, &mut report);
        report.query_time = started.elapsed();
        self.last_end = end;
        self.track_overrun(&mut report);

        haps.sort_by(|a, b| a.part.begin.cmp(&b.part.begin));
        for hap in haps {
            if self.config.onsets_only && !hap.has_onset() {
                continue;
            }
            let event = self.schedule(hap);
            let cycle = event.cycle;
            match sink.deliver(event) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!("sink failed on event at cycle {:.4}: {}", cycle, e);
                }
            }
        }

        report.window = Some(window);
        report
    }

    fn promote_pending(&mut self, report: &mut TickReport) {
        let Some(pattern) = self.slot.take() else {
            return;
        };
        match self.config.swap {
            SwapMode::NextTick => {
                self.active = Some(pattern);
                self.deferred = None;
                report.swapped = true;
                debug!("pattern swapped at cycle {}", self.last_end);
            }
            SwapMode::NextCycle => {
                let boundary = self.last_end.ceil();
                debug!("pattern swap deferred to cycle {}", boundary);
                self.deferred = Some((pattern, boundary));
            }
        }
    }

    /// Query the active pattern, splitting at a deferred swap's boundary.
    fn query_window(&mut self, window: &TimeSpan, report: &mut TickReport) -> Vec<Hap<T>> {
        let boundary = match &self.deferred {
            Some((_, boundary)) if *boundary < window.end => boundary.clone(),
            _ => return self.query_active(window.clone()),
        };

        let mut haps = Vec::new();
        let mut rest = window.clone();
        if window.begin < boundary {
            haps.extend(self.query_active(TimeSpan::new(window.begin.clone(), boundary.clone())));
            rest = TimeSpan::new(boundary.clone(), window.end.clone());
        }
        if let Some((pattern, _)) = self.deferred.take() {
            self.active = Some(pattern);
            report.swapped = true;
            debug!("pattern swapped at cycle {}", boundary);
        }
        haps.extend(self.query_active(rest));
        haps
    }

    fn query_active(&self, span: TimeSpan) -> Vec<Hap<T>> {
        match &self.active {
            Some(pattern) => pattern.query(&State::with_seed(span, self.config.seed)),
            None => Vec::new(),
        }
    }

    fn track_overrun(&mut self, report: &mut TickReport) {
        let budget = self.config.lookahead;
        let spent = report.query_time.as_secs_f64();
        if spent > budget {
            report.overrun = true;
            self.overruns += 1;
            warn!(
                "tick query took {:.1}ms, over the {:.1}ms lookahead",
                spent * 1000.0,
                budget * 1000.0
            );
            if self.overruns >= self.config.overrun_limit && !self.degraded {
                self.degraded = true;
                error!("{} consecutive overruns, transport degraded", self.overruns);
            }
        } else {
            if self.degraded {
                info!("transport recovered from overruns");
            }
            self.overruns = 0;
            self.degraded = false;
        }
    }

    fn schedule(&self, hap: Hap<T>) -> ScheduledEvent<T> {
        let cps = self.config.cps;
        let cycle = hap.part.begin.to_f64();
        ScheduledEvent {
            trigger_time: self.origin + cycle / cps + self.config.latency,
            duration: hap.whole.as_ref().map(|w| w.duration().to_f64() / cps),
            onset: hap.has_onset(),
            cps,
            cycle,
            hap,
        }
    }
}

impl<T> std::fmt::Debug for Cyclist<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cyclist")
            .field("transport", &self.transport)
            .field("cps", &self.config.cps)
            .field("origin", &self.origin)
            .field("last_end", &self.last_end)
            .field("degraded", &self.degraded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::pattern::{pure, sequence};
    use assert_approx_eq::assert_approx_eq;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            cps: 1.0,
            lookahead: 0.1,
            latency: 0.0,
            ..SchedulerConfig::default()
        }
    }

    fn collect<T: Clone>(out: &mut Vec<ScheduledEvent<T>>) -> impl FnMut(ScheduledEvent<T>) -> Result<(), SinkError> + '_ {
        move |event| {
            out.push(event);
            Ok(())
        }
    }

    fn abcd() -> Pattern<&'static str> {
        sequence(vec![pure("a"), pure("b"), pure("c"), pure("d")])
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::at(1.5);
        clock.advance(0.25);
        assert_approx_eq!(clock.now(), 1.75);
        let shared: Arc<dyn Clock> = Arc::new(ManualClock::new());
        assert_eq!(shared.now(), 0.0);
    }

    #[test]
    fn test_windows_are_contiguous() {
        let mut cyclist = Cyclist::with_pattern(config(), abcd()).unwrap();
        let mut events = Vec::new();
        cyclist.start(0.0);

        let mut previous_end = Fraction::zero();
        for i in 0..38 {
            let report = cyclist.tick(i as f64 * 0.05, &mut collect(&mut events));
            let window = report.window.unwrap();
            assert_eq!(window.begin, previous_end);
            previous_end = window.end;
        }

        let onsets: Vec<_> = events.iter().filter(|e| e.onset).map(|e| e.hap.value).collect();
        assert_eq!(onsets, vec!["a", "b", "c", "d", "a", "b", "c", "d"]);
    }

    #[test]
    fn test_trigger_times_follow_tempo() {
        let config = SchedulerConfig {
            cps: 0.5,
            latency: 0.1,
            ..config()
        };
        let mut cyclist = Cyclist::with_pattern(config, abcd()).unwrap();
        let mut events = Vec::new();
        cyclist.start(10.0);
        cyclist.tick(10.0, &mut collect(&mut events));
        cyclist.tick(11.0, &mut collect(&mut events));

        assert_eq!(events.len(), 4);
        let onsets: Vec<_> = events.iter().filter(|e| e.onset).collect();
        assert_eq!(onsets.len(), 3);
        assert_approx_eq!(onsets[0].trigger_time, 10.1);
        assert_approx_eq!(onsets[1].trigger_time, 10.6);
        assert_approx_eq!(onsets[2].trigger_time, 11.1);
        assert_approx_eq!(onsets[0].duration.unwrap(), 0.5);
        assert_approx_eq!(onsets[2].cycle, 0.5);
    }

    #[test]
    fn test_straddling_event_arrives_as_fragments() {
        let mut cyclist = Cyclist::with_pattern(config(), pure("long")).unwrap();
        let mut events = Vec::new();
        cyclist.start(0.0);
        cyclist.tick(0.0, &mut collect(&mut events));
        cyclist.tick(0.4, &mut collect(&mut events));

        assert_eq!(events.len(), 2);
        assert!(events[0].onset);
        assert!(!events[1].onset);
        assert_eq!(events[0].hap.whole, events[1].hap.whole);
        assert_eq!(events[0].hap.part.end, events[1].hap.part.begin);
    }

    #[test]
    fn test_onsets_only_skips_fragments() {
        let config = SchedulerConfig {
            onsets_only: true,
            ..config()
        };
        let mut cyclist = Cyclist::with_pattern(config, pure("long")).unwrap();
        let mut events = Vec::new();
        cyclist.start(0.0);
        cyclist.tick(0.0, &mut collect(&mut events));
        cyclist.tick(0.4, &mut collect(&mut events));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_swap_takes_effect_next_tick() {
        let mut cyclist = Cyclist::with_pattern(config(), abcd()).unwrap();
        let mut events = Vec::new();
        cyclist.start(0.0);
        cyclist.tick(0.0, &mut collect(&mut events));
        cyclist.tick(0.3, &mut collect(&mut events));
        let delivered: Vec<_> = events.clone();

        cyclist.set_pattern(sequence(vec![pure("x"), pure("y"), pure("z"), pure("w")]));
        let report = cyclist.tick(0.6, &mut collect(&mut events));
        assert!(report.swapped);
        assert_eq!(&events[..delivered.len()], &delivered[..]);
        let fresh: Vec<_> = events[delivered.len()..]
            .iter()
            .filter(|e| e.onset)
            .map(|e| e.hap.value)
            .collect();
        assert_eq!(fresh, vec!["z"]);
    }

    #[test]
    fn test_swap_at_next_cycle() {
        let config = SchedulerConfig {
            swap: SwapMode::NextCycle,
            ..config()
        };
        let mut cyclist = Cyclist::with_pattern(config, pure("old")).unwrap();
        let mut events = Vec::new();
        cyclist.start(0.0);
        cyclist.tick(0.5, &mut collect(&mut events));

        cyclist.set_pattern(pure("new"));
        let report = cyclist.tick(1.5, &mut collect(&mut events));
        assert!(report.swapped);

        let values: Vec<_> = events.iter().map(|e| (e.hap.value, e.onset)).collect();
        assert_eq!(values, vec![("old", true), ("old", false), ("new", true)]);
        assert_eq!(events[2].hap.part.begin, Fraction::one());
    }

    #[test]
    fn test_pause_and_resume_keep_phase() {
        let mut cyclist = Cyclist::with_pattern(config(), abcd()).unwrap();
        let mut events = Vec::new();
        cyclist.start(0.0);
        cyclist.tick(0.3, &mut collect(&mut events));
        cyclist.pause(0.3);
        assert_eq!(cyclist.state(), Transport::Paused);
        assert_eq!(cyclist.cycle_position(5.0), Fraction::new(3, 10));

        let report = cyclist.tick(2.0, &mut collect(&mut events));
        assert_eq!(report, TickReport::default());

        cyclist.start(10.0);
        assert_eq!(cyclist.cycle_position(10.0), Fraction::new(3, 10));
        cyclist.tick(10.3, &mut collect(&mut events));
        let onsets: Vec<_> = events.iter().filter(|e| e.onset).map(|e| e.hap.value).collect();
        assert_eq!(onsets, vec!["a", "b", "c"]);
        let c = events.iter().find(|e| e.hap.value == "c").unwrap();
        assert_approx_eq!(c.trigger_time, 10.2);
    }

    #[test]
    fn test_stop_restarts_from_zero() {
        let mut cyclist = Cyclist::with_pattern(config(), abcd()).unwrap();
        let mut events = Vec::new();
        cyclist.start(0.0);
        cyclist.tick(2.3, &mut collect(&mut events));
        cyclist.stop();
        assert_eq!(cyclist.state(), Transport::Stopped);
        assert_eq!(cyclist.tick(3.0, &mut collect(&mut events)).window, None);

        events.clear();
        cyclist.start(5.0);
        let report = cyclist.tick(5.0, &mut collect(&mut events));
        assert_eq!(report.window.unwrap().begin, Fraction::zero());
        assert_eq!(events[0].hap.value, "a");
    }

    #[test]
    fn test_set_tempo_is_continuous() {
        let mut cyclist = Cyclist::with_pattern(config(), abcd()).unwrap();
        cyclist.start(0.0);
        let before = cyclist.cycle_position(2.0);
        cyclist.set_tempo(2.0, 2.0).unwrap();
        assert_eq!(cyclist.cycle_position(2.0), before);
        assert_eq!(cyclist.cycle_position(2.5), Fraction::from_integer(3));

        assert_eq!(cyclist.set_tempo(0.0, 3.0), Err(Error::InvalidTempo(0.0)));
        assert_eq!(cyclist.set_lookahead(-1.0), Err(Error::InvalidLookahead(-1.0)));
        assert_eq!(cyclist.cps(), 2.0);
    }

    #[test]
    fn test_sink_failure_does_not_stop_delivery() {
        let mut cyclist = Cyclist::with_pattern(config(), abcd()).unwrap();
        let mut seen = Vec::new();
        let mut flaky = |event: ScheduledEvent<&'static str>| {
            if event.hap.value == "b" {
                return Err(SinkError::Rejected("no b".to_string()));
            }
            seen.push(event.hap.value);
            Ok(())
        };
        cyclist.start(0.0);
        let report = cyclist.tick(0.9, &mut flaky);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 3);
        assert_eq!(seen, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_channel_sink_reports_full() {
        let (tx, rx) = crossbeam_channel::bounded(2);
        let mut sink = ChannelSink::new(tx);
        let mut cyclist = Cyclist::with_pattern(config(), abcd()).unwrap();
        cyclist.start(0.0);
        let report = cyclist.tick(0.9, &mut sink);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(rx.try_recv().unwrap().hap.value, "a");

        drop(rx);
        assert_eq!(
            sink.deliver(ScheduledEvent {
                hap: Hap::new(None, TimeSpan::from_integers(0, 1), "x"),
                trigger_time: 0.0,
                duration: None,
                onset: false,
                cps: 1.0,
                cycle: 0.0,
            }),
            Err(SinkError::Disconnected)
        );
    }

    #[test]
    fn test_overruns_degrade_then_recover() {
        let config = SchedulerConfig {
            lookahead: 0.001,
            overrun_limit: 2,
            ..config()
        };
        let slow = Pattern::new(|_: &State| {
            std::thread::sleep(Duration::from_millis(5));
            Vec::<Hap<i32>>::new()
        });
        let mut cyclist = Cyclist::with_pattern(config, slow).unwrap();
        let mut sink = |_: ScheduledEvent<i32>| -> Result<(), SinkError> { Ok(()) };
        cyclist.start(0.0);

        assert!(cyclist.tick(0.1, &mut sink).overrun);
        assert!(!cyclist.is_degraded());
        cyclist.tick(0.2, &mut sink);
        assert!(cyclist.is_degraded());

        cyclist.set_pattern(pure(1));
        let report = cyclist.tick(0.3, &mut sink);
        assert!(!report.overrun);
        assert!(!cyclist.is_degraded());
    }

    #[test]
    fn test_notation_errors_keep_previous_pattern() {
        let slot: PatternSlot<Value> = PatternSlot::new();
        assert!(slot.set_notation("bd [sn").is_err());
        assert!(!slot.is_pending());
        slot.set_notation("bd sn").unwrap();
        assert!(slot.is_pending());
        assert_eq!(slot.take().unwrap().first_cycle().len(), 2);
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_query_seed_reaches_random_patterns() {
        let pat = pure(1).fast(16).degrade();
        let run = |seed: u64| {
            let config = SchedulerConfig {
                seed,
                ..config()
            };
            let mut cyclist = Cyclist::with_pattern(config, pat.clone()).unwrap();
            let mut events = Vec::new();
            cyclist.start(0.0);
            cyclist.tick(3.9, &mut collect(&mut events));
            events.into_iter().map(|e| e.cycle.to_bits()).collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }
}
