use super::MAX_CHANGE_AGE;

/// A value of the world's wrapping logical clock.
///
/// Ticks are compared by their wrapping distance to a reference tick rather than by absolute
/// value, so the clock can wrap around `u32::MAX` as long as stored ticks are rebased by
/// [`Tick::check_tick`] often enough.
#[derive(Default, Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Tick {
    tick: u32,
}

impl Tick {
    /// The oldest tick that still compares correctly against the present.
    pub const MAX: Self = Self::new(MAX_CHANGE_AGE);

    /// Create a tick from a raw clock value.
    #[inline]
    pub const fn new(tick: u32) -> Self {
        Self { tick }
    }

    /// The raw clock value.
    #[inline]
    pub const fn get(self) -> u32 {
        self.tick
    }

    /// Overwrite the raw clock value.
    #[inline]
    pub fn set(&mut self, tick: u32) {
        self.tick = tick;
    }

    /// Returns `true` if this tick happened after `last_run`, judged from `this_run`.
    ///
    /// Both ages are measured backwards from `this_run` and saturated at [`MAX_CHANGE_AGE`], so a
    /// tick stamped at `this_run` is never newer than a window that starts at `this_run`.
    #[inline]
    pub fn is_newer_than(self, last_run: Tick, this_run: Tick) -> bool {
        let ticks_since_insert = this_run.relative_to(self).tick.min(MAX_CHANGE_AGE);
        let ticks_since_system = this_run.relative_to(last_run).tick.min(MAX_CHANGE_AGE);

        ticks_since_system > ticks_since_insert
    }

    /// The wrapping distance from `other` to `self`.
    #[inline]
    pub fn relative_to(self, other: Self) -> Self {
        Self::new(self.tick.wrapping_sub(other.tick))
    }

    /// Rebase the tick to exactly [`Tick::MAX`] old if it is older than that.
    ///
    /// Returns `true` if the tick was rebased.
    #[inline]
    pub fn check_tick(&mut self, check: CheckChangeTicks) -> bool {
        let age = check.present_tick().relative_to(*self);
        if age.get() > Self::MAX.get() {
            *self = check.present_tick().relative_to(Self::MAX);
            true
        } else {
            false
        }
    }
}

/// The event of a periodic tick sweep, carrying the tick the sweep was relative to.
#[derive(Debug, Clone, Copy)]
pub struct CheckChangeTicks(pub(crate) Tick);

impl CheckChangeTicks {
    /// Create a sweep relative to `present`.
    #[inline]
    pub const fn new(present: Tick) -> Self {
        Self(present)
    }

    /// The tick every stored tick was compared against.
    #[inline]
    pub fn present_tick(self) -> Tick {
        self.0
    }
}

/// The added and changed ticks of one stored component or resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ComponentTicks {
    /// Tick recording when the value was added.
    pub added: Tick,

    /// Tick recording the last time the value was changed, additions included.
    pub changed: Tick,
}

impl ComponentTicks {
    /// Ticks for a value added (and therefore changed) at `change_tick`.
    #[inline]
    pub fn new(change_tick: Tick) -> Self {
        Self {
            added: change_tick,
            changed: change_tick,
        }
    }

    /// Returns `true` if the value was added after `last_run`.
    #[inline]
    pub fn is_added(&self, last_run: Tick, this_run: Tick) -> bool {
        self.added.is_newer_than(last_run, this_run)
    }

    /// Returns `true` if the value was changed after `last_run`.
    #[inline]
    pub fn is_changed(&self, last_run: Tick, this_run: Tick) -> bool {
        self.changed.is_newer_than(last_run, this_run)
    }

    /// Mark the value as changed at `change_tick`. The added tick is preserved.
    #[inline]
    pub fn set_changed(&mut self, change_tick: Tick) {
        self.changed = change_tick;
    }

    /// Rebase both ticks.
    #[inline]
    pub fn check_ticks(&mut self, check: CheckChangeTicks) {
        self.added.check_tick(check);
        self.changed.check_tick(check);
    }
}

/// Shared borrow of a value's ticks plus the window they are judged in.
#[derive(Clone, Copy)]
pub(crate) struct Ticks<'w> {
    pub(crate) added: &'w Tick,
    pub(crate) changed: &'w Tick,
    pub(crate) last_run: Tick,
    pub(crate) this_run: Tick,
}

/// Mutable borrow of a value's ticks plus the window they are judged in.
pub(crate) struct TicksMut<'w> {
    pub(crate) added: &'w mut Tick,
    pub(crate) changed: &'w mut Tick,
    pub(crate) last_run: Tick,
    pub(crate) this_run: Tick,
}

impl<'w> From<TicksMut<'w>> for Ticks<'w> {
    fn from(ticks: TicksMut<'w>) -> Self {
        Ticks {
            added: ticks.added,
            changed: ticks.changed,
            last_run: ticks.last_run,
            this_run: ticks.this_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_detection::CHECK_TICK_THRESHOLD;

    #[test]
    fn tick_is_not_newer_than_itself() {
        // Given
        let this_run = Tick::new(42);

        // Then
        assert!(!this_run.is_newer_than(this_run, this_run));
    }

    #[test]
    fn tick_after_last_run_is_newer() {
        // Given
        let last_run = Tick::new(10);
        let this_run = Tick::new(20);

        // Then
        assert!(Tick::new(15).is_newer_than(last_run, this_run));
        assert!(Tick::new(20).is_newer_than(last_run, this_run));
        assert!(!Tick::new(10).is_newer_than(last_run, this_run));
        assert!(!Tick::new(5).is_newer_than(last_run, this_run));
    }

    #[test]
    fn comparison_survives_wraparound() {
        // Given
        let last_run = Tick::new(u32::MAX - 5);
        let this_run = Tick::new(10);

        // Then
        assert!(Tick::new(2).is_newer_than(last_run, this_run));
        assert!(Tick::new(u32::MAX).is_newer_than(last_run, this_run));
        assert!(!Tick::new(u32::MAX - 10).is_newer_than(last_run, this_run));
    }

    #[test]
    fn ages_saturate_at_max_change_age() {
        // Given
        let this_run = Tick::new(MAX_CHANGE_AGE + 100);
        let last_run = Tick::new(0);

        // When both are older than the maximum age they saturate to the same value
        let changed = Tick::new(50);

        // Then
        assert!(!changed.is_newer_than(last_run, this_run));
    }

    #[test]
    fn check_tick_rebases_old_ticks() {
        // Given
        let mut old = Tick::new(0);
        let mut recent = Tick::new(MAX_CHANGE_AGE + CHECK_TICK_THRESHOLD);
        let present = Tick::new(MAX_CHANGE_AGE + CHECK_TICK_THRESHOLD);

        // When
        let rebased_old = old.check_tick(CheckChangeTicks::new(present));
        let rebased_recent = recent.check_tick(CheckChangeTicks::new(present));

        // Then
        assert!(rebased_old);
        assert!(!rebased_recent);
        assert_eq!(present.relative_to(old).get(), MAX_CHANGE_AGE);
        assert_eq!(recent, present);
    }

    #[test]
    fn set_changed_keeps_added() {
        // Given
        let mut ticks = ComponentTicks::new(Tick::new(3));

        // When
        ticks.set_changed(Tick::new(9));

        // Then
        assert_eq!(ticks.added, Tick::new(3));
        assert_eq!(ticks.changed, Tick::new(9));
        assert!(!ticks.is_added(Tick::new(5), Tick::new(10)));
        assert!(ticks.is_changed(Tick::new(5), Tick::new(10)));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ticks_inside_the_window_are_newer(
                this_run in any::<u32>(),
                window in 1u32..MAX_CHANGE_AGE,
                offset in 0u32..MAX_CHANGE_AGE,
            ) {
                let this_run = Tick::new(this_run);
                let last_run = Tick::new(this_run.get().wrapping_sub(window));
                let tick = Tick::new(this_run.get().wrapping_sub(offset));
                let expected = this_run.relative_to(tick).get() < this_run.relative_to(last_run).get();
                prop_assert_eq!(tick.is_newer_than(last_run, this_run), expected);
            }
        }
    }
}
