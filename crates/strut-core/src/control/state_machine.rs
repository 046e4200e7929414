//! Wanted/system state cell with edge detection
//!
//! Every subsystem follows the same pattern: callers write a wanted state
//! from any thread, and the control thread resolves it into a system state
//! once per tick. The cell keeps both, plus the edge flag that says whether
//! the latest tick entered a new system state, under one lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// An operator intent as stored in a [`StateCell`]
///
/// Typed writes always produce `Known`. `Unrecognized` only appears when a
/// raw code from outside the type system fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wanted<W> {
    Known(W),
    Unrecognized(u32),
}

impl<W: Copy> Wanted<W> {
    /// The typed intent, if recognized
    pub fn known(&self) -> Option<W> {
        match self {
            Self::Known(w) => Some(*w),
            Self::Unrecognized(_) => None,
        }
    }
}

impl<W: fmt::Display> fmt::Display for Wanted<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(w) => write!(f, "{}", w),
            Self::Unrecognized(code) => write!(f, "UNRECOGNIZED({})", code),
        }
    }
}

/// Detects entry into a new state
///
/// Holds the last persisted state. [`observe`](Self::observe) compares the
/// next state against it *before* storing, so the flag is true on exactly
/// one tick per change.
#[derive(Debug, Clone, Copy)]
pub struct EdgeTrigger<S> {
    current: S,
    entered: bool,
}

impl<S: Copy + PartialEq> EdgeTrigger<S> {
    /// Start in `initial` with no pending edge
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            entered: false,
        }
    }

    /// Persist `next` and report whether it differs from the previous state
    pub fn observe(&mut self, next: S) -> bool {
        self.entered = next != self.current;
        self.current = next;
        self.entered
    }

    /// The last persisted state
    #[inline]
    pub fn current(&self) -> S {
        self.current
    }

    /// Whether the most recent observation was an entry
    #[inline]
    pub fn entered(&self) -> bool {
        self.entered
    }
}

/// Outcome of one [`StateCell::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick<S> {
    /// System state persisted by this tick
    pub state: S,
    /// System state before this tick
    pub previous: S,
    /// True iff `state != previous`; entry actions run only then
    pub entered: bool,
    /// Raw code that fell back to the safe state, reported once per write
    pub unrecognized: Option<u32>,
}

/// Consistent view of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot<W, S> {
    pub wanted: Wanted<W>,
    pub system: S,
    pub entered: bool,
}

struct CellInner<W, S> {
    wanted: Wanted<W>,
    edge: EdgeTrigger<S>,
    unrecognized_reported: bool,
}

impl<W, S> CellInner<W, S> {
    fn claim_report(&mut self) -> Option<u32> {
        match self.wanted {
            Wanted::Unrecognized(code) if !self.unrecognized_reported => {
                self.unrecognized_reported = true;
                Some(code)
            }
            _ => None,
        }
    }
}

/// The per-subsystem critical section
///
/// Writers and the control thread only ever hold the lock for a few loads
/// and stores. Actuation happens after [`advance`](Self::advance) returns.
pub struct StateCell<W, S> {
    inner: Mutex<CellInner<W, S>>,
    safe: S,
}

impl<W, S> StateCell<W, S>
where
    W: Copy + PartialEq + Debug,
    S: Copy + PartialEq + Debug,
{
    /// Create a cell; `safe` is where unrecognized intents resolve to
    pub fn new(wanted: W, system: S, safe: S) -> Self {
        Self {
            inner: Mutex::new(CellInner {
                wanted: Wanted::Known(wanted),
                edge: EdgeTrigger::new(system),
                unrecognized_reported: false,
            }),
            safe,
        }
    }

    /// Store a new intent. Last write wins; nothing moves until the next tick.
    pub fn set_wanted(&self, wanted: W) {
        self.store(Wanted::Known(wanted));
    }

    /// Store an intent from a raw code
    pub fn set_wanted_code(&self, code: u32)
    where
        W: TryFrom<u32>,
    {
        let wanted = match W::try_from(code) {
            Ok(w) => Wanted::Known(w),
            Err(_) => Wanted::Unrecognized(code),
        };
        self.store(wanted);
    }

    fn store(&self, wanted: Wanted<W>) {
        let mut inner = self.inner.lock();
        inner.wanted = wanted;
        inner.unrecognized_reported = false;
    }

    /// Resolve the wanted state and persist the result
    ///
    /// `resolver` runs under the lock and must be pure.
    pub fn advance(&self, resolver: impl FnOnce(W) -> S) -> Tick<S> {
        let mut inner = self.inner.lock();
        let wanted = inner.wanted;
        let (candidate, unrecognized) = match wanted {
            Wanted::Known(w) => (resolver(w), None),
            Wanted::Unrecognized(_) => (self.safe, inner.claim_report()),
        };
        let previous = inner.edge.current();
        let entered = inner.edge.observe(candidate);
        Tick {
            state: candidate,
            previous,
            entered,
            unrecognized,
        }
    }

    /// The stored unrecognized code, if it hasn't been reported since the
    /// last write
    ///
    /// Shares the once-per-write flag with [`advance`](Self::advance), so a
    /// bad write is reported once no matter which path sees it first.
    pub fn claim_unrecognized(&self) -> Option<u32> {
        self.inner.lock().claim_report()
    }

    /// Force both states, clearing any pending edge
    pub fn reset(&self, wanted: W, system: S) {
        let mut inner = self.inner.lock();
        inner.wanted = Wanted::Known(wanted);
        inner.edge = EdgeTrigger::new(system);
        inner.unrecognized_reported = false;
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot<W, S> {
        let inner = self.inner.lock();
        Snapshot {
            wanted: inner.wanted,
            system: inner.edge.current(),
            entered: inner.edge.entered(),
        }
    }

    #[inline]
    pub fn wanted(&self) -> Wanted<W> {
        self.inner.lock().wanted
    }

    #[inline]
    pub fn system(&self) -> S {
        self.inner.lock().edge.current()
    }

    /// State that unrecognized intents resolve to
    #[inline]
    pub fn safe_state(&self) -> S {
        self.safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Want {
        Off,
        On,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Sys {
        Stopped,
        Running,
    }

    impl TryFrom<u32> for Want {
        type Error = ();

        fn try_from(code: u32) -> Result<Self, ()> {
            match code {
                0 => Ok(Want::Off),
                1 => Ok(Want::On),
                _ => Err(()),
            }
        }
    }

    fn resolve(w: Want) -> Sys {
        match w {
            Want::Off => Sys::Stopped,
            Want::On => Sys::Running,
        }
    }

    fn cell() -> StateCell<Want, Sys> {
        StateCell::new(Want::Off, Sys::Stopped, Sys::Stopped)
    }

    #[test]
    fn test_edge_trigger_fires_once_per_change() {
        let mut edge = EdgeTrigger::new(Sys::Stopped);
        assert!(!edge.observe(Sys::Stopped));
        assert!(edge.observe(Sys::Running));
        assert!(!edge.observe(Sys::Running));
        assert!(edge.observe(Sys::Stopped));
        assert_eq!(edge.current(), Sys::Stopped);
    }

    #[test]
    fn test_no_entry_without_change() {
        let cell = cell();
        let tick = cell.advance(resolve);
        assert!(!tick.entered);
        assert_eq!(tick.state, Sys::Stopped);
    }

    #[test]
    fn test_entry_then_steady() {
        let cell = cell();
        cell.set_wanted(Want::On);

        let first = cell.advance(resolve);
        assert!(first.entered);
        assert_eq!(first.previous, Sys::Stopped);
        assert_eq!(first.state, Sys::Running);

        cell.set_wanted(Want::On);
        let second = cell.advance(resolve);
        assert!(!second.entered);
        assert_eq!(cell.system(), Sys::Running);
    }

    #[test]
    fn test_last_write_wins() {
        let cell = cell();
        cell.set_wanted(Want::On);
        cell.set_wanted(Want::Off);
        let tick = cell.advance(resolve);
        assert!(!tick.entered);
        assert_eq!(tick.state, Sys::Stopped);
    }

    #[test]
    fn test_unrecognized_code_resolves_safe_and_reports_once() {
        let cell = cell();
        cell.set_wanted(Want::On);
        cell.advance(resolve);

        cell.set_wanted_code(42);
        assert_eq!(cell.wanted(), Wanted::Unrecognized(42));

        let first = cell.advance(resolve);
        assert_eq!(first.state, Sys::Stopped);
        assert!(first.entered);
        assert_eq!(first.unrecognized, Some(42));

        let second = cell.advance(resolve);
        assert_eq!(second.unrecognized, None);
        assert!(!second.entered);

        cell.set_wanted_code(42);
        assert_eq!(cell.advance(resolve).unrecognized, Some(42));
    }

    #[test]
    fn test_claim_shares_report_with_advance() {
        let cell = cell();
        assert_eq!(cell.claim_unrecognized(), None);

        cell.set_wanted_code(9);
        assert_eq!(cell.claim_unrecognized(), Some(9));
        assert_eq!(cell.claim_unrecognized(), None);
        assert_eq!(cell.advance(resolve).unrecognized, None);

        cell.set_wanted_code(9);
        assert_eq!(cell.advance(resolve).unrecognized, Some(9));
        assert_eq!(cell.claim_unrecognized(), None);
    }

    #[test]
    fn test_known_code() {
        let cell = cell();
        cell.set_wanted_code(1);
        assert_eq!(cell.wanted(), Wanted::Known(Want::On));
        assert_eq!(cell.wanted().known(), Some(Want::On));
    }

    #[test]
    fn test_reset_clears_edge() {
        let cell = cell();
        cell.set_wanted(Want::On);
        cell.advance(resolve);
        assert!(cell.snapshot().entered);

        cell.reset(Want::Off, Sys::Stopped);
        let snapshot = cell.snapshot();
        assert_eq!(snapshot.wanted, Wanted::Known(Want::Off));
        assert_eq!(snapshot.system, Sys::Stopped);
        assert!(!snapshot.entered);
    }
}
