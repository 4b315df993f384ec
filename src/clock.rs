//! Time sources for the filesystem's logical clock.

use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of millisecond timestamps.
///
/// Operations read the clock once per mutation; a fixed clock makes a
/// mutation sequence fully reproducible.
#[derive(Clone)]
pub enum Clock {
    /// A fixed millisecond value. Any negative value means "wall clock
    /// now", honoring the `-1` sentinel convention.
    Fixed(i64),
    /// The host wall clock.
    System,
    /// A caller-supplied callable producing milliseconds. It must not
    /// call back into the filesystem it is installed on.
    Callback(Rc<dyn Fn() -> i64>),
}

impl Clock {
    /// The current time in milliseconds.
    #[must_use]
    pub fn now(&self) -> i64 {
        match self {
            Self::Fixed(ms) if *ms >= 0 => *ms,
            Self::Fixed(_) | Self::System => wall_clock_ms(),
            Self::Callback(f) => f(),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::System
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(ms) => f.debug_tuple("Fixed").field(ms).finish(),
            Self::System => f.write_str("System"),
            Self::Callback(_) => f.debug_struct("Callback").finish_non_exhaustive(),
        }
    }
}

impl From<i64> for Clock {
    fn from(ms: i64) -> Self {
        Self::Fixed(ms)
    }
}

impl From<SystemTime> for Clock {
    fn from(time: SystemTime) -> Self {
        Self::Fixed(system_time_ms(time))
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "millisecond counts fit i64 for any realistic clock"
)]
pub(crate) fn system_time_ms(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

fn wall_clock_ms() -> i64 {
    system_time_ms(SystemTime::now())
}
