//! # quaver
//!
//! A cycle-based pattern algebra for algorithmic music, with a compact text
//! notation and a live scheduler.
//!
//! ## Core Concepts
//!
//! - **Pattern**: A function from a queried time span to events. Patterns are
//!   immutable; combinators wrap them rather than change them.
//! - **Hap**: An event (happening) with a value active during a timespan.
//! - **Fraction**: Exact rational time, so nested subdivisions never drift.
//! - **TimeSpan**: An arc of time with begin and end points.
//! - **Cyclist**: The transport that queries ahead of playback and maps cycles
//!   onto wall-clock time.
//!
//! ## Example
//!
//! ```rust
//! use quaver::*;
//!
//! // Create a simple pattern
//! let pat = sequence(vec![pure(1), pure(2), pure(3), pure(4)]);
//!
//! // Query the first cycle
//! let events = pat.first_cycle();
//! assert_eq!(events.len(), 4);
//!
//! // Transform the pattern
//! let doubled = pat.fmap(|x| x * 2).fast(2);
//! assert_eq!(doubled.first_cycle().len(), 8);
//!
//! // Or write it as notation
//! let beat = mini("bd*2 [sn cp]").unwrap();
//! assert_eq!(beat.first_cycle().len(), 4);
//! ```
//!
//! ## Playing Patterns
//!
//! ```rust,no_run
//! use quaver::*;
//!
//! let config = SchedulerConfig::default();
//! let (handle, events) = start_scheduler_with_channel(config, mini("bd sn").unwrap()).unwrap();
//! handle.set_notation("bd(3,8) <sn cp>").unwrap();
//! for event in events.iter().take(8) {
//!     println!("{:.3}s {}", event.trigger_time, event.hap.value);
//! }
//! handle.stop();
//! ```

// Core modules
pub mod error;
pub mod euclid;
pub mod fraction;
pub mod hap;
pub mod mini;
pub mod pattern;
pub mod signal;
pub mod state;
pub mod timespan;
pub mod value;

// Playback modules
pub mod cyclist;
pub mod scheduler;

// Re-export core types
pub use error::{Error, ParseError, ParseErrorKind, Result, SinkError};
pub use euclid::{bjorklund, euclid, euclid_bool};
pub use fraction::Fraction;
pub use hap::{Context, Hap, Location};
pub use mini::{compile, mini, parse, Node, Step};
pub use pattern::{
    app_both, app_left, app_right, cat, fastcat, gap, iota, polymeter, pure, run, sequence,
    silence, slowcat, stack, timecat, Pattern,
};
pub use signal::{
    choose_cycles, cosine, irand, isaw, rand, rand_at, range, saw, segment, sine, square, time,
    tri,
};
pub use state::State;
pub use timespan::TimeSpan;
pub use value::Value;

pub use cyclist::{
    ChannelSink, Clock, Cyclist, ManualClock, PatternSlot, Sink, SystemClock, TickReport,
    Transport,
};
pub use scheduler::{ScheduledEvent, SchedulerConfig, SwapMode};

// Re-export scheduler functions (native only)
#[cfg(not(target_arch = "wasm32"))]
pub use scheduler::{
    play_blocking, start_scheduler, start_scheduler_with_channel, start_scheduler_with_clock,
    SchedulerHandle,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::fraction::Fraction;
    pub use crate::hap::Hap;
    pub use crate::mini::mini;
    pub use crate::pattern::{fastcat, pure, sequence, silence, slowcat, stack, timecat, Pattern};
    pub use crate::signal::{rand, saw, sine};
    pub use crate::timespan::TimeSpan;
    pub use crate::value::Value;
    pub use crate::cyclist::{Cyclist, ManualClock};
    pub use crate::scheduler::SchedulerConfig;

    #[cfg(not(target_arch = "wasm32"))]
    pub use crate::scheduler::{play_blocking, start_scheduler};
}
