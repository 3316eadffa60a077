//! Scheduler configuration and the threaded driver.
//!
//! The driver owns a [`Cyclist`] on a background thread. The thread ticks,
//! then waits up to one tick interval on a control channel, so control
//! messages are handled promptly and nothing spins.
//!
//! Note: the threaded driver is only available on native platforms. In the
//! browser, drive a `Cyclist` from the host's own timer instead.

use crate::error::{Error, Result};
use crate::hap::Hap;

/// When a newly set pattern replaces the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SwapMode {
    /// At the start of the next tick's window.
    #[default]
    NextTick,
    /// At the first whole cycle at or after the next window start.
    NextCycle,
}

/// An event ready to be triggered, with absolute timing information.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent<T> {
    /// The hap as the pattern produced it. May be a fragment.
    pub hap: Hap<T>,
    /// Wall-clock seconds at which to trigger, latency included.
    pub trigger_time: f64,
    /// Length of the whole event in seconds. `None` for continuous haps.
    pub duration: Option<f64>,
    /// Whether this hap carries the start of its event.
    pub onset: bool,
    /// Tempo at scheduling time.
    pub cps: f64,
    /// Cycle position of the part's start.
    pub cycle: f64,
}

/// Configuration for the scheduler.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SchedulerConfig {
    /// Cycles per second (tempo). Default: 0.5 (one cycle every 2 seconds).
    pub cps: f64,
    /// How often to tick, in seconds. Default: 0.05 (50ms).
    pub tick_interval: f64,
    /// How far ahead to look for events, in seconds. Default: 0.1.
    pub lookahead: f64,
    /// Latency buffer before triggering, in seconds. Default: 0.1.
    pub latency: f64,
    /// Query seed for random patterns.
    pub seed: u64,
    pub swap: SwapMode,
    /// Deliver only haps that carry an onset.
    pub onsets_only: bool,
    /// Consecutive overrunning ticks before the transport counts as degraded.
    pub overrun_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            cps: 0.5,
            tick_interval: 0.05,
            lookahead: 0.1,
            latency: 0.1,
            seed: 0,
            swap: SwapMode::NextTick,
            onsets_only: false,
            overrun_limit: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        check_cps(self.cps)?;
        check_lookahead(self.lookahead)?;
        if !(self.tick_interval.is_finite() && self.tick_interval > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "tick_interval must be positive, got {}",
                self.tick_interval
            )));
        }
        if !(self.latency.is_finite() && self.latency >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "latency must not be negative, got {}",
                self.latency
            )));
        }
        if self.overrun_limit == 0 {
            return Err(Error::InvalidConfig(
                "overrun_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn check_cps(cps: f64) -> Result<()> {
    if cps.is_finite() && cps > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidTempo(cps))
    }
}

pub(crate) fn check_lookahead(secs: f64) -> Result<()> {
    if secs.is_finite() && secs > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidLookahead(secs))
    }
}

// Native-only scheduler implementation using threads and channels
#[cfg(not(target_arch = "wasm32"))]
mod native {
    use super::*;
    use crate::cyclist::{
        ChannelSink, Clock, Cyclist, PatternSlot, Sink, SystemClock, Transport, TransportSnapshot,
    };
    use crate::fraction::Fraction;
    use crate::pattern::Pattern;
    use crate::value::Value;
    use arc_swap::ArcSwap;
    use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
    use log::{debug, warn};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    /// Messages sent to the scheduler thread.
    enum SchedulerMessage {
        SetCps(f64),
        SetLookahead(f64),
        Pause,
        Resume,
        Stop,
    }

    /// State shared between the driver thread and its handle.
    struct Shared {
        running: AtomicBool,
        degraded: AtomicBool,
        snapshot: ArcSwap<TransportSnapshot>,
    }

    /// Handle to control a running scheduler.
    pub struct SchedulerHandle<T> {
        sender: Sender<SchedulerMessage>,
        shared: Arc<Shared>,
        slot: PatternSlot<T>,
        clock: Arc<dyn Clock>,
        thread: Option<JoinHandle<()>>,
    }

    impl<T: Clone + Send + Sync + 'static> SchedulerHandle<T> {
        /// Set a new pattern to play from the next tick on.
        pub fn set_pattern(&self, pattern: Pattern<T>) {
            self.slot.set(pattern);
        }

        /// Update the tempo.
        pub fn set_cps(&self, cps: f64) -> Result<()> {
            check_cps(cps)?;
            self.send(SchedulerMessage::SetCps(cps));
            Ok(())
        }

        pub fn set_lookahead(&self, secs: f64) -> Result<()> {
            check_lookahead(secs)?;
            self.send(SchedulerMessage::SetLookahead(secs));
            Ok(())
        }

        pub fn pause(&self) {
            self.send(SchedulerMessage::Pause);
        }

        pub fn resume(&self) {
            self.send(SchedulerMessage::Resume);
        }

        /// Stop the scheduler. No tick starts after this returns.
        pub fn stop(&self) {
            self.shared.running.store(false, Ordering::SeqCst);
            self.send(SchedulerMessage::Stop);
        }

        /// Stop and wait for the driver thread to finish.
        pub fn stop_and_join(mut self) {
            self.stop();
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    warn!("scheduler thread panicked");
                }
            }
        }

        /// Check if the scheduler is still running.
        pub fn is_running(&self) -> bool {
            self.shared.running.load(Ordering::SeqCst)
        }

        pub fn is_degraded(&self) -> bool {
            self.shared.degraded.load(Ordering::SeqCst)
        }

        /// Current cycle position, from the driver's latest transport state.
        pub fn cycle_position(&self) -> Fraction {
            self.shared.snapshot.load().cycle_position(self.clock.now())
        }

        pub fn transport(&self) -> Transport {
            self.shared.snapshot.load().transport
        }

        fn send(&self, message: SchedulerMessage) {
            if self.sender.send(message).is_err() {
                debug!("scheduler thread already gone");
            }
        }
    }

    impl SchedulerHandle<Value> {
        /// Compile notation and play it from the next tick on. On error the
        /// current pattern keeps playing.
        pub fn set_notation(&self, src: &str) -> Result<()> {
            self.slot.set_notation(src)
        }
    }

    /// Start a scheduler on the system clock.
    pub fn start_scheduler<T, S>(
        config: SchedulerConfig,
        initial_pattern: Pattern<T>,
        sink: S,
    ) -> Result<SchedulerHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
        S: Sink<T> + Send + 'static,
    {
        start_scheduler_with_clock(config, initial_pattern, sink, Arc::new(SystemClock::new()))
    }

    /// Start a scheduler that reads time from `clock`.
    pub fn start_scheduler_with_clock<T, S>(
        config: SchedulerConfig,
        initial_pattern: Pattern<T>,
        mut sink: S,
        clock: Arc<dyn Clock>,
    ) -> Result<SchedulerHandle<T>>
    where
        T: Clone + Send + Sync + 'static,
        S: Sink<T> + Send + 'static,
    {
        let tick_interval = Duration::from_secs_f64(config.tick_interval);
        let mut cyclist = Cyclist::with_pattern(config, initial_pattern)?;
        cyclist.start(clock.now());

        // Unbounded so control calls never wait on a slow sink.
        let (tx, rx) = unbounded::<SchedulerMessage>();
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            degraded: AtomicBool::new(false),
            snapshot: ArcSwap::from_pointee(cyclist.snapshot()),
        });
        let slot = cyclist.slot();

        let thread_shared = shared.clone();
        let thread_clock = clock.clone();
        let thread = thread::spawn(move || {
            scheduler_loop(cyclist, &mut sink, rx, thread_shared, thread_clock, tick_interval);
        });

        Ok(SchedulerHandle {
            sender: tx,
            shared,
            slot,
            clock,
            thread: Some(thread),
        })
    }

    /// Start a scheduler that sends events to a channel.
    ///
    /// Returns a handle and a receiver to consume events. Events that don't
    /// fit in the channel are dropped and logged.
    pub fn start_scheduler_with_channel<T>(
        config: SchedulerConfig,
        initial_pattern: Pattern<T>,
    ) -> Result<(SchedulerHandle<T>, Receiver<ScheduledEvent<T>>)>
    where
        T: Clone + Send + Sync + 'static,
    {
        let (event_tx, event_rx) = bounded::<ScheduledEvent<T>>(256);
        let handle = start_scheduler(config, initial_pattern, ChannelSink::new(event_tx))?;
        Ok((handle, event_rx))
    }

    fn scheduler_loop<T, S>(
        mut cyclist: Cyclist<T>,
        sink: &mut S,
        rx: Receiver<SchedulerMessage>,
        shared: Arc<Shared>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) where
        T: Clone + Send + Sync + 'static,
        S: Sink<T>,
    {
        while shared.running.load(Ordering::SeqCst) {
            cyclist.tick(clock.now(), sink);
            shared.degraded.store(cyclist.is_degraded(), Ordering::SeqCst);

            match rx.recv_timeout(tick_interval) {
                Ok(message) => {
                    let now = clock.now();
                    let applied = match message {
                        SchedulerMessage::SetCps(cps) => cyclist.set_tempo(cps, now),
                        SchedulerMessage::SetLookahead(secs) => cyclist.set_lookahead(secs),
                        SchedulerMessage::Pause => {
                            cyclist.pause(now);
                            Ok(())
                        }
                        SchedulerMessage::Resume => {
                            cyclist.start(now);
                            Ok(())
                        }
                        SchedulerMessage::Stop => break,
                    };
                    if let Err(e) = applied {
                        warn!("scheduler ignored control message: {}", e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            shared.snapshot.store(Arc::new(cyclist.snapshot()));
        }

        cyclist.stop();
        shared.running.store(false, Ordering::SeqCst);
        shared.snapshot.store(Arc::new(cyclist.snapshot()));
    }

    /// A simple blocking player that plays a pattern for a given number of cycles.
    pub fn play_blocking<T, S>(
        pattern: Pattern<T>,
        cycles: f64,
        config: SchedulerConfig,
        sink: S,
    ) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
        S: Sink<T> + Send + 'static,
    {
        let duration = Duration::from_secs_f64((cycles / config.cps).max(0.0));
        let clock = SystemClock::new();

        let handle = start_scheduler(config, pattern, sink)?;
        while clock.now() < duration.as_secs_f64() {
            thread::sleep(Duration::from_millis(10));
        }
        handle.stop_and_join();
        Ok(())
    }
}

// Re-export native scheduler functions
#[cfg(not(target_arch = "wasm32"))]
pub use native::{
    play_blocking, start_scheduler, start_scheduler_with_channel, start_scheduler_with_clock,
    SchedulerHandle,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.swap, SwapMode::NextTick);
        assert_eq!(config.overrun_limit, 3);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_cps = SchedulerConfig {
            cps: 0.0,
            ..Default::default()
        };
        assert_eq!(bad_cps.validate(), Err(Error::InvalidTempo(0.0)));

        let bad_lookahead = SchedulerConfig {
            lookahead: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            bad_lookahead.validate(),
            Err(Error::InvalidLookahead(_))
        ));

        for config in [
            SchedulerConfig {
                tick_interval: 0.0,
                ..Default::default()
            },
            SchedulerConfig {
                latency: -0.1,
                ..Default::default()
            },
            SchedulerConfig {
                overrun_limit: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod driver_tests {
    use super::*;
    use crate::cyclist::{ManualClock, Transport};
    use crate::error::SinkError;
    use crate::fraction::Fraction;
    use crate::pattern::{pure, sequence};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_scheduler_basic() {
        init_logging();
        let events: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();

        let pat = sequence(vec![pure(1), pure(2), pure(3), pure(4)]);

        let config = SchedulerConfig {
            cps: 2.0,
            tick_interval: 0.01,
            lookahead: 0.1,
            latency: 0.0,
            onsets_only: true,
            ..Default::default()
        };

        // Play for 2 full cycles to ensure we capture at least one complete cycle
        play_blocking(pat, 2.0, config, move |event: ScheduledEvent<i32>| {
            events_clone.lock().unwrap().push(event.hap.value);
            Ok::<(), SinkError>(())
        })
        .unwrap();

        let collected = events.lock().unwrap();
        assert!(collected.len() >= 4, "Expected at least 4 events, got {}", collected.len());
        for value in 1..=4 {
            assert!(collected.contains(&value), "Missing value {}", value);
        }
    }

    #[test]
    fn test_scheduler_with_channel() {
        let pat = sequence(vec![pure("a"), pure("b")]);

        let config = SchedulerConfig {
            cps: 4.0,
            tick_interval: 0.01,
            lookahead: 0.05,
            latency: 0.0,
            ..Default::default()
        };

        let (handle, rx) = start_scheduler_with_channel(config, pat).unwrap();

        thread::sleep(Duration::from_millis(150));
        handle.stop_and_join();

        let events: Vec<_> = rx.try_iter().map(|event| event.hap.value).collect();
        assert!(!events.is_empty());
        assert_eq!(events[0], "a");
    }

    #[test]
    fn test_handle_controls_manual_clock() {
        let clock = Arc::new(ManualClock::new());
        let config = SchedulerConfig {
            cps: 1.0,
            tick_interval: 0.005,
            ..Default::default()
        };
        let sink = |_: ScheduledEvent<&'static str>| -> Result<(), SinkError> { Ok(()) };
        let handle = start_scheduler_with_clock(config, pure("x"), sink, clock.clone()).unwrap();

        clock.set(0.5);
        assert_eq!(handle.cycle_position(), Fraction::new(1, 2));
        assert!(handle.set_cps(-1.0).is_err());

        handle.pause();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while handle.transport() != Transport::Paused && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.transport(), Transport::Paused);
        clock.set(3.0);
        assert_eq!(handle.cycle_position(), Fraction::new(1, 2));

        handle.stop();
        assert!(!handle.is_running());
        handle.stop_and_join();
    }

    #[test]
    fn test_notation_error_keeps_scheduler_running() {
        init_logging();
        let (handle, _rx) = start_scheduler_with_channel(
            SchedulerConfig {
                tick_interval: 0.01,
                ..Default::default()
            },
            pure(crate::value::Value::from("bd")),
        )
        .unwrap();
        assert!(handle.set_notation("bd [sn").is_err());
        assert!(handle.set_notation("bd sn").is_ok());
        assert!(handle.is_running());
        assert!(!handle.is_degraded());
        handle.stop_and_join();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SchedulerConfig {
            cps: -2.0,
            ..Default::default()
        };
        assert!(start_scheduler_with_channel(config, pure(1)).is_err());
    }

    #[test]
    fn test_controls_do_not_wait_on_a_stalled_sink() {
        init_logging();
        let stalled = Arc::new(AtomicBool::new(false));
        let stalled_in_sink = stalled.clone();
        let config = SchedulerConfig {
            cps: 8.0,
            tick_interval: 0.005,
            lookahead: 0.05,
            ..Default::default()
        };
        let handle = start_scheduler(config, pure(1), move |_event: ScheduledEvent<i32>| {
            if !stalled_in_sink.swap(true, Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(300));
            }
            Ok::<(), SinkError>(())
        })
        .unwrap();

        while !stalled.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        let started = std::time::Instant::now();
        for _ in 0..500 {
            handle.pause();
            handle.resume();
        }
        handle.stop();
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(!handle.is_running());
        handle.stop_and_join();
    }
}
