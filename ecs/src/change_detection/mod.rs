//! Change detection for components and resources.
//!
//! Every stored value carries [`ComponentTicks`]: the tick it was added at and the tick it was
//! last changed at. Readers judge those ticks against a `(last_run, this_run)` window, so
//! "changed since I last looked" is a pure comparison with no per-reader state in storage.
//!
//! # Smart pointers
//!
//! | Pointer | Access | Stamps `changed` |
//! |---------|--------|------------------|
//! | [`Ref`] | shared component | never |
//! | [`Mut`] | exclusive component | on `DerefMut` |
//! | [`Res`] | shared resource | never |
//! | [`ResMut`] | exclusive resource | on `DerefMut` |
//!
//! # Wraparound
//!
//! The clock is a wrapping `u32`. Ages are saturated at [`MAX_CHANGE_AGE`], and
//! [`World::check_change_ticks`](crate::world::World::check_change_ticks) must rebase stored
//! ticks at least every `2 * CHECK_TICK_THRESHOLD - 1` ticks or old changes start to look new.

mod tick;

use std::ops::{Deref, DerefMut};

pub use tick::{CheckChangeTicks, ComponentTicks, Tick};
pub(crate) use tick::{Ticks, TicksMut};

/// The minimum number of world tick increments between tick sweeps.
///
/// Sweeps can only happen between mutations, so the real gap is at most `2 * N - 1` ticks.
// 1000 ticks per frame * 144 frames per second * 3600 seconds per hour
pub const CHECK_TICK_THRESHOLD: u32 = 518_400_000;

/// The largest tick age that cannot overflow before the next sweep.
///
/// Changes older than this stop being detected.
pub const MAX_CHANGE_AGE: u32 = u32::MAX - (2 * CHECK_TICK_THRESHOLD - 1);

/// Read access to a value's change ticks.
pub trait DetectChanges {
    /// Returns `true` if the value was added after the reader last ran.
    fn is_added(&self) -> bool;

    /// Returns `true` if the value was added or mutated after the reader last ran.
    fn is_changed(&self) -> bool;

    /// The tick of the last change.
    fn last_changed(&self) -> Tick;

    /// The tick the value was added at.
    fn added(&self) -> Tick;
}

/// Write access that stamps change ticks.
pub trait DetectChangesMut: DetectChanges {
    /// The wrapped value type.
    type Inner: ?Sized;

    /// Stamp the value as changed without touching it.
    fn set_changed(&mut self);

    /// Overwrite the last changed tick by hand.
    fn set_last_changed(&mut self, last_changed: Tick);

    /// Mutable access that does not stamp the changed tick.
    fn bypass_change_detection(&mut self) -> &mut Self::Inner;

    /// Replace the value only if it differs, stamping the tick only in that case.
    ///
    /// Returns `true` if the value was replaced.
    #[inline]
    fn set_if_neq(&mut self, value: Self::Inner) -> bool
    where
        Self::Inner: Sized + PartialEq,
    {
        let old = self.bypass_change_detection();
        if *old != value {
            *old = value;
            self.set_changed();
            true
        } else {
            false
        }
    }
}

macro_rules! impl_detect_changes {
    ($name:ident < $($generics:tt),+ >, $($traits:ident)?) => {
        impl<$($generics),* : ?Sized $(+ $traits)?> DetectChanges for $name<'_, $($generics),*> {
            #[inline]
            fn is_added(&self) -> bool {
                self.ticks.added.is_newer_than(self.ticks.last_run, self.ticks.this_run)
            }

            #[inline]
            fn is_changed(&self) -> bool {
                self.ticks.changed.is_newer_than(self.ticks.last_run, self.ticks.this_run)
            }

            #[inline]
            fn last_changed(&self) -> Tick {
                *self.ticks.changed
            }

            #[inline]
            fn added(&self) -> Tick {
                *self.ticks.added
            }
        }

        impl<$($generics),* : ?Sized $(+ $traits)?> AsRef<$($generics),*> for $name<'_, $($generics),*> {
            #[inline]
            fn as_ref(&self) -> &$($generics),* {
                self.deref()
            }
        }
    };
}

macro_rules! impl_detect_changes_mut {
    ($name:ident < $($generics:tt),+ >, $($traits:ident)?) => {
        impl<$($generics),* : ?Sized $(+ $traits)?> DetectChangesMut for $name<'_, $($generics),*> {
            type Inner = $($generics),*;

            #[inline]
            fn set_changed(&mut self) {
                *self.ticks.changed = self.ticks.this_run;
            }

            #[inline]
            fn set_last_changed(&mut self, last_changed: Tick) {
                *self.ticks.changed = last_changed;
            }

            #[inline]
            fn bypass_change_detection(&mut self) -> &mut Self::Inner {
                self.value
            }
        }

        impl<$($generics),* : ?Sized $(+ $traits)?> DerefMut for $name<'_, $($generics),*> {
            #[inline]
            fn deref_mut(&mut self) -> &mut Self::Target {
                self.set_changed();
                self.value
            }
        }

        impl<$($generics),* : ?Sized $(+ $traits)?> AsMut<$($generics),*> for $name<'_, $($generics),*> {
            #[inline]
            fn as_mut(&mut self) -> &mut $($generics),* {
                self.deref_mut()
            }
        }
    };
}

macro_rules! impl_deref {
    ($name:ident < $($generics:tt),+ >, $($traits:ident)?) => {
        impl<$($generics),* : ?Sized $(+ $traits)?> Deref for $name<'_, $($generics),*> {
            type Target = $($generics),*;

            #[inline]
            fn deref(&self) -> &Self::Target {
                self.value
            }
        }
    };
}

/// Shared borrow of a component together with its change ticks.
pub struct Ref<'w, T: ?Sized> {
    pub(crate) value: &'w T,
    pub(crate) ticks: Ticks<'w>,
}

impl<'w, T: ?Sized> Ref<'w, T> {
    pub(crate) fn new(value: &'w T, ticks: Ticks<'w>) -> Self {
        Self { value, ticks }
    }

    /// The inner reference with the lifetime of the borrow.
    #[inline]
    pub fn into_inner(self) -> &'w T {
        self.value
    }

    /// Map to a borrow of part of the value, keeping the ticks.
    pub fn map<U: ?Sized>(self, f: impl FnOnce(&T) -> &U) -> Ref<'w, U> {
        Ref {
            value: f(self.value),
            ticks: self.ticks,
        }
    }
}

/// Exclusive borrow of a component that stamps its changed tick on mutation.
pub struct Mut<'w, T: ?Sized> {
    pub(crate) value: &'w mut T,
    pub(crate) ticks: TicksMut<'w>,
}

impl<'w, T: ?Sized> Mut<'w, T> {
    pub(crate) fn new(value: &'w mut T, ticks: TicksMut<'w>) -> Self {
        Self { value, ticks }
    }

    /// Consume the pointer, stamping it as changed, and return the inner reference.
    #[inline]
    pub fn into_inner(mut self) -> &'w mut T {
        self.set_changed();
        self.value
    }

    /// Reborrow for a shorter lifetime.
    pub fn reborrow(&mut self) -> Mut<'_, T> {
        Mut {
            value: self.value,
            ticks: TicksMut {
                added: self.ticks.added,
                changed: self.ticks.changed,
                last_run: self.ticks.last_run,
                this_run: self.ticks.this_run,
            },
        }
    }
}

impl<'w, T: ?Sized> From<Mut<'w, T>> for Ref<'w, T> {
    fn from(value: Mut<'w, T>) -> Self {
        Ref {
            value: value.value,
            ticks: value.ticks.into(),
        }
    }
}

/// Shared borrow of a resource together with its change ticks.
pub struct Res<'w, T: ?Sized> {
    pub(crate) value: &'w T,
    pub(crate) ticks: Ticks<'w>,
}

impl<'w, T: ?Sized> Res<'w, T> {
    pub(crate) fn new(value: &'w T, ticks: Ticks<'w>) -> Self {
        Self { value, ticks }
    }

    /// The inner reference with the lifetime of the borrow.
    #[inline]
    pub fn into_inner(self) -> &'w T {
        self.value
    }
}

/// Exclusive borrow of a resource that stamps its changed tick on mutation.
pub struct ResMut<'w, T: ?Sized> {
    pub(crate) value: &'w mut T,
    pub(crate) ticks: TicksMut<'w>,
}

impl<'w, T: ?Sized> ResMut<'w, T> {
    pub(crate) fn new(value: &'w mut T, ticks: TicksMut<'w>) -> Self {
        Self { value, ticks }
    }

    /// Consume the pointer, stamping it as changed, and return the inner reference.
    #[inline]
    pub fn into_inner(mut self) -> &'w mut T {
        self.set_changed();
        self.value
    }
}

impl<'w, T: ?Sized> From<ResMut<'w, T>> for Res<'w, T> {
    fn from(value: ResMut<'w, T>) -> Self {
        Res {
            value: value.value,
            ticks: value.ticks.into(),
        }
    }
}

impl_deref!(Ref<T>,);
impl_detect_changes!(Ref<T>,);
impl_deref!(Mut<T>,);
impl_detect_changes!(Mut<T>,);
impl_detect_changes_mut!(Mut<T>,);
impl_deref!(Res<T>,);
impl_detect_changes!(Res<T>,);
impl_deref!(ResMut<T>,);
impl_detect_changes!(ResMut<T>,);
impl_detect_changes_mut!(ResMut<T>,);

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks_mut<'a>(added: &'a mut Tick, changed: &'a mut Tick, this_run: u32) -> TicksMut<'a> {
        TicksMut {
            added,
            changed,
            last_run: Tick::new(this_run - 1),
            this_run: Tick::new(this_run),
        }
    }

    #[test]
    fn mut_stamps_changed_on_deref_mut() {
        // Given
        let mut value = 1u32;
        let (mut added, mut changed) = (Tick::new(1), Tick::new(1));
        let mut ptr = Mut::new(&mut value, ticks_mut(&mut added, &mut changed, 5));
        assert!(!ptr.is_changed());

        // When
        *ptr += 1;

        // Then
        assert!(ptr.is_changed());
        assert!(!ptr.is_added());
        assert_eq!(ptr.last_changed(), Tick::new(5));
        drop(ptr);
        assert_eq!(value, 2);
        assert_eq!(changed, Tick::new(5));
        assert_eq!(added, Tick::new(1));
    }

    #[test]
    fn reading_through_mut_does_not_stamp() {
        // Given
        let mut value = 7u32;
        let (mut added, mut changed) = (Tick::new(1), Tick::new(1));
        let ptr = Mut::new(&mut value, ticks_mut(&mut added, &mut changed, 5));

        // When
        let read = *ptr;

        // Then
        assert_eq!(read, 7);
        assert!(!ptr.is_changed());
    }

    #[test]
    fn set_if_neq_only_stamps_on_difference() {
        // Given
        let mut value = 3u32;
        let (mut added, mut changed) = (Tick::new(1), Tick::new(1));
        let mut ptr = ResMut::new(&mut value, ticks_mut(&mut added, &mut changed, 8));

        // When
        let same = ptr.set_if_neq(3);

        // Then
        assert!(!same);
        assert!(!ptr.is_changed());

        // When
        let different = ptr.set_if_neq(4);

        // Then
        assert!(different);
        assert!(ptr.is_changed());
    }

    #[test]
    fn ref_map_keeps_ticks() {
        // Given
        let value = (1u8, 2u16);
        let (added, changed) = (Tick::new(4), Tick::new(4));
        let ticks = Ticks {
            added: &added,
            changed: &changed,
            last_run: Tick::new(3),
            this_run: Tick::new(4),
        };

        // When
        let mapped = Ref::new(&value, ticks).map(|pair| &pair.1);

        // Then
        assert_eq!(*mapped, 2);
        assert!(mapped.is_added());
    }
}
