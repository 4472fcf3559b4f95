//! Storage for resources: values that exist at most once per world.
//!
//! Resources share the [`ComponentId`] space with components. Each registered resource gets a
//! [`ResourceData`] slot which may or may not hold a value at any given time, along with the
//! ticks of its last insert and change.
//!
//! # Resources vs Components
//!
//! | Aspect | Resource | Component |
//! |--------|----------|-----------|
//! | Cardinality | One per type per world | Many per type (one per entity) |
//! | Access | Direct by type | Query over matching entities |
//! | Storage | [`Resources`] | Tables or sparse sets |

use std::any::Any;

use crate::{
    change_detection::{CheckChangeTicks, ComponentTicks, Tick},
    component::ComponentId,
    storage::SparseSet,
};

/// The slot for a single resource.
pub struct ResourceData {
    value: Option<Box<dyn Any + Send + Sync>>,
    ticks: ComponentTicks,
    name: String,
}

impl std::fmt::Debug for ResourceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceData")
            .field("name", &self.name)
            .field("present", &self.is_present())
            .field("ticks", &self.ticks)
            .finish()
    }
}

impl ResourceData {
    fn new(name: String) -> Self {
        Self {
            value: None,
            ticks: ComponentTicks::new(Tick::new(0)),
            name,
        }
    }

    /// The resource's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the slot holds a value.
    #[inline]
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// The resource value, type-erased.
    #[inline]
    pub fn get_any(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.value.as_deref()
    }

    /// The resource value.
    #[inline]
    pub fn get<R: 'static>(&self) -> Option<&R> {
        self.value.as_ref()?.downcast_ref::<R>()
    }

    /// The resource value with its ticks.
    #[inline]
    pub fn get_with_ticks<R: 'static>(&self) -> Option<(&R, &ComponentTicks)> {
        let value = self.value.as_ref()?.downcast_ref::<R>()?;
        Some((value, &self.ticks))
    }

    /// The resource value with its ticks, mutably.
    #[inline]
    pub(crate) fn get_with_ticks_mut<R: 'static>(
        &mut self,
    ) -> Option<(&mut R, &mut ComponentTicks)> {
        let value = self.value.as_mut()?.downcast_mut::<R>()?;
        Some((value, &mut self.ticks))
    }

    /// The ticks of the slot. Stale when no value is present.
    #[inline]
    pub fn ticks(&self) -> ComponentTicks {
        self.ticks
    }

    /// Store `value`. A fresh value gets both ticks, an overwrite only the changed tick.
    pub(crate) fn insert<R: Send + Sync + 'static>(&mut self, value: R, change_tick: Tick) {
        if self.value.is_some() {
            self.ticks.set_changed(change_tick);
        } else {
            self.ticks = ComponentTicks::new(change_tick);
        }
        self.value = Some(Box::new(value));
    }

    /// Take the value out of the slot.
    pub(crate) fn remove<R: 'static>(&mut self) -> Option<R> {
        let value = self.value.take()?;
        match value.downcast::<R>() {
            Ok(value) => Some(*value),
            Err(value) => {
                self.value = Some(value);
                None
            }
        }
    }

    /// Drop the value, if any. Returns `true` if there was one.
    pub(crate) fn remove_and_drop(&mut self) -> bool {
        self.value.take().is_some()
    }

    pub(crate) fn check_change_ticks(&mut self, check: CheckChangeTicks) {
        if self.value.is_some() {
            self.ticks.check_ticks(check);
        }
    }
}

/// Every resource slot of a world, keyed by [`ComponentId`].
#[derive(Debug, Default)]
pub struct Resources {
    resources: SparseSet<ComponentId, ResourceData>,
}

impl Resources {
    /// The number of resource slots, present or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if no slot exists.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Every slot with its resource id.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &ResourceData)> {
        self.resources.iter().map(|(id, data)| (*id, data))
    }

    /// The slot of a resource.
    #[inline]
    pub fn get(&self, id: ComponentId) -> Option<&ResourceData> {
        self.resources.get(id)
    }

    /// The slot of a resource, mutably.
    #[inline]
    pub(crate) fn get_mut(&mut self, id: ComponentId) -> Option<&mut ResourceData> {
        self.resources.get_mut(id)
    }

    /// The slot of a resource, created empty on first use.
    pub(crate) fn get_or_insert(&mut self, id: ComponentId, name: &str) -> &mut ResourceData {
        self.resources
            .get_or_insert_with(id, || ResourceData::new(name.to_owned()))
    }

    pub(crate) fn check_change_ticks(&mut self, check: CheckChangeTicks) {
        for data in self.resources.values_mut() {
            data.check_change_ticks(check);
        }
    }

    /// Drop every resource value, keeping the slots.
    pub(crate) fn clear(&mut self) {
        for data in self.resources.values_mut() {
            data.remove_and_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Score(u32);

    #[test]
    fn insert_then_get() {
        // Given
        let mut resources = Resources::default();
        let id = ComponentId::new(3);

        // When
        resources
            .get_or_insert(id, "Score")
            .insert(Score(10), Tick::new(1));

        // Then
        let data = resources.get(id).unwrap();
        assert!(data.is_present());
        assert_eq!(data.get::<Score>(), Some(&Score(10)));
        assert_eq!(data.ticks().added, Tick::new(1));
    }

    #[test]
    fn overwrite_keeps_added_tick() {
        // Given
        let mut resources = Resources::default();
        let id = ComponentId::new(0);
        resources.get_or_insert(id, "Score").insert(Score(1), Tick::new(1));

        // When
        resources.get_or_insert(id, "Score").insert(Score(2), Tick::new(5));

        // Then
        let ticks = resources.get(id).unwrap().ticks();
        assert_eq!(ticks.added, Tick::new(1));
        assert_eq!(ticks.changed, Tick::new(5));
    }

    #[test]
    fn remove_takes_value_and_keeps_slot() {
        // Given
        let mut resources = Resources::default();
        let id = ComponentId::new(0);
        resources.get_or_insert(id, "Score").insert(Score(7), Tick::new(1));

        // When
        let removed = resources.get_mut(id).unwrap().remove::<Score>();

        // Then
        assert_eq!(removed, Some(Score(7)));
        assert!(!resources.get(id).unwrap().is_present());
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn remove_with_wrong_type_leaves_value() {
        // Given
        let mut resources = Resources::default();
        let id = ComponentId::new(0);
        resources.get_or_insert(id, "Score").insert(Score(7), Tick::new(1));

        // When
        let removed = resources.get_mut(id).unwrap().remove::<u64>();

        // Then
        assert_eq!(removed, None);
        assert!(resources.get(id).unwrap().is_present());
    }

    #[test]
    fn clear_drops_values() {
        // Given
        let mut resources = Resources::default();
        resources
            .get_or_insert(ComponentId::new(0), "Score")
            .insert(Score(1), Tick::new(0));

        // When
        resources.clear();

        // Then
        assert!(!resources.get(ComponentId::new(0)).unwrap().is_present());
    }
}
