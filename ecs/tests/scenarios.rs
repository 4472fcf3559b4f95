use rusty_ecs::{
    archetype::{ArchetypeId, ArchetypeRow, ComponentStatus},
    component::RequiredComponentsError,
    prelude::*,
    query::FilteredAccess,
};

#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Component, Debug, PartialEq, Default)]
struct Health(u32);

#[derive(Component, Debug, PartialEq)]
#[require(Health)]
struct Player;

#[derive(Component, Debug, PartialEq)]
#[component(storage = "SparseSet")]
#[require(Health = Health(50))]
struct Enemy;

#[derive(Component, Debug, PartialEq, Default)]
struct Left;

#[derive(Component, Debug, PartialEq, Default)]
struct Right;

#[derive(Component, Debug, PartialEq)]
#[component(immutable)]
struct Name(&'static str);

#[test]
fn spawn_then_query() {
    // Given
    let mut world = World::new();
    let position = world.register_component::<Position>();

    // When
    world.spawn(Position { x: 1.0, y: 2.0 });

    // Then
    let stored: Vec<_> = world
        .archetypes()
        .iter()
        .filter(|archetype| archetype.id() != ArchetypeId::EMPTY)
        .collect();
    assert_eq!(stored.len(), 1);
    let archetype = stored[0];
    assert!(archetype.contains(position));
    assert_eq!(archetype.len(), 1);

    let value = world
        .get_component(archetype.id(), ArchetypeRow::new(0), position)
        .and_then(|component| component.downcast_ref::<Position>());
    assert_eq!(value, Some(&Position { x: 1.0, y: 2.0 }));

    let mut query = world.query::<&Position>();
    assert_eq!(
        query.iter(&world).copied().collect::<Vec<_>>(),
        vec![Position { x: 1.0, y: 2.0 }]
    );
}

#[test]
fn required_components_are_added_on_spawn() {
    // Given
    let mut world = World::new();
    let health = world.register_component::<Health>();

    // When
    let player = world.spawn(Player);

    // Then
    assert_eq!(world.get::<Player>(player), Some(&Player));
    assert_eq!(world.get::<Health>(player), Some(&Health(0)));

    let bundle_id = world.register_bundle::<Player>().unwrap();
    let after = world
        .archetypes()
        .empty()
        .edges()
        .get_archetype_after_bundle_insert(bundle_id)
        .unwrap();
    assert_eq!(after.status_of(health), Some(ComponentStatus::Added));
}

#[test]
fn required_component_constructor_expression() {
    // Given
    let mut world = World::new();

    // When
    let enemy = world.spawn(Enemy);
    let boss = world.spawn((Enemy, Health(500)));

    // Then
    assert_eq!(world.get::<Health>(enemy), Some(&Health(50)));
    assert_eq!(world.get::<Health>(boss), Some(&Health(500)));
    let enemy_id = world.component_id::<Enemy>().unwrap();
    let info = world.components().get_info(enemy_id).unwrap();
    assert_eq!(info.storage_type(), StorageType::SparseSet);
}

#[test]
fn runtime_requirement_reaches_registered_bundles() {
    // Given
    let mut world = World::new();
    world.register_bundle::<Velocity>().unwrap();
    world.register_bundle::<(Player, Left)>().unwrap();

    // When
    world
        .try_register_required_components::<Velocity, Position>()
        .unwrap();
    world
        .try_register_required_components::<Health, Right>()
        .unwrap();

    // Then
    let moving = world.spawn(Velocity { x: 1.0, y: 0.0 });
    assert_eq!(world.get::<Position>(moving), Some(&Position::default()));
    let player = world.spawn((Player, Left));
    assert_eq!(world.get::<Health>(player), Some(&Health(0)));
    assert_eq!(world.get::<Right>(player), Some(&Right));
}

#[test]
fn runtime_requirement_rejected_for_stored_indirect_requiree() {
    // Given
    let mut world = World::new();
    world.spawn(Player);

    // When
    let result = world.try_register_required_components::<Health, Right>();

    // Then
    assert!(matches!(
        result,
        Err(RequiredComponentsError::ArchetypeExists(_))
    ));
    let player = world.spawn(Player);
    assert_eq!(world.get::<Right>(player), None);
}

#[test]
fn insert_with_keep_mode_leaves_existing_value() {
    // Given
    let mut world = World::new();
    let entity = world.spawn(Health(3));

    // When
    world.insert(entity, Health(5), InsertMode::Keep).unwrap();

    // Then
    assert_eq!(world.get::<Health>(entity), Some(&Health(3)));
}

#[test]
fn insert_with_replace_mode_overwrites() {
    // Given
    let mut world = World::new();
    let entity = world.spawn(Health(3));

    // When
    world.insert(entity, (Health(5), Velocity::default()), InsertMode::Replace).unwrap();

    // Then
    assert_eq!(world.get::<Health>(entity), Some(&Health(5)));
    assert_eq!(world.get::<Velocity>(entity), Some(&Velocity::default()));
}

#[test]
fn cyclic_requirement_is_rejected_without_changes() {
    // Given
    let mut world = World::new();
    world.register_required_components::<Left, Right>();
    let left = world.component_id::<Left>().unwrap();
    let right = world.component_id::<Right>().unwrap();
    let required_of = |world: &World, id| {
        world
            .components()
            .get_required_components(id)
            .map(|required| required.all().keys().copied().collect::<Vec<_>>())
    };
    let left_before = required_of(&world, left);
    let right_before = required_of(&world, right);

    // When
    let result = world.try_register_required_components::<Right, Left>();

    // Then
    assert!(matches!(
        result,
        Err(RequiredComponentsError::CyclicRequirement { .. })
    ));
    assert_eq!(required_of(&world, left), left_before);
    assert_eq!(required_of(&world, right), right_before);
    assert_eq!(left_before, Some(vec![right]));
}

#[test]
fn despawn_keeps_other_entities_addressable() {
    // Given
    let mut world = World::new();
    let first = world.spawn((Position { x: 1.0, y: 0.0 }, Enemy));
    let second = world.spawn((Position { x: 2.0, y: 0.0 }, Enemy));
    let third = world.spawn((Position { x: 3.0, y: 0.0 }, Enemy));

    // When
    assert!(world.despawn(first));

    // Then
    assert!(!world.contains_entity(first));
    assert_eq!(world.get::<Position>(second).map(|p| p.x), Some(2.0));
    assert_eq!(world.get::<Position>(third).map(|p| p.x), Some(3.0));
    assert_eq!(world.get::<Enemy>(third), Some(&Enemy));
    assert!(!world.despawn(first));

    let recycled = world.spawn(Position::default());
    assert_eq!(recycled.index(), first.index());
    assert!(recycled.generation() > first.generation());
}

#[test]
fn remove_and_take() {
    // Given
    let mut world = World::new();
    let entity = world.spawn((Position::default(), Velocity { x: 1.0, y: 1.0 }, Health(9)));

    // When
    let taken = world.take::<(Velocity, Health)>(entity);
    world.remove::<(Position, Enemy)>(entity).unwrap();

    // Then
    assert_eq!(taken, Some((Velocity { x: 1.0, y: 1.0 }, Health(9))));
    let entity_ref = world.entity(entity).unwrap();
    assert_eq!(entity_ref.components().count(), 0);
    assert_eq!(world.take::<Health>(entity), None);
}

#[test]
fn change_detection_through_queries() {
    // Given
    let mut world = World::new();
    let still = world.spawn((Position::default(), Velocity::default()));
    let moving = world.spawn((Position::default(), Velocity { x: 1.0, y: 0.0 }));
    world.clear_trackers();

    // When
    let mut movement = world.query::<(&mut Position, &Velocity)>();
    for (mut position, velocity) in movement.iter_mut(&mut world) {
        if velocity.x != 0.0 {
            position.x += velocity.x;
        }
    }

    // Then
    let mut changed = world.query_filtered::<Entity, Changed<Position>>();
    assert_eq!(changed.iter(&world).collect::<Vec<_>>(), vec![moving]);
    assert_eq!(world.get::<Position>(still), Some(&Position::default()));

    world.clear_trackers();
    assert_eq!(changed.iter(&world).count(), 0);
}

#[test]
fn immutable_components_are_read_only() {
    // Given
    let mut world = World::new();
    let entity = world.spawn(Name("crate"));

    // When
    world.insert(entity, Name("replaced"), InsertMode::Replace).unwrap();

    // Then
    let mut query = world.query::<&Name>();
    assert_eq!(query.get(&world, entity), Some(&Name("replaced")));
}

#[test]
fn with_and_without_filters_are_compatible() {
    // Given
    let mut world = World::new();
    let with = world.query_filtered::<&mut Health, With<Player>>();
    let without = world.query_filtered::<&mut Health, Without<Player>>();
    let plain = world.query::<&mut Health>();

    // Then
    assert!(with.is_compatible(&without));
    assert!(without.is_compatible(&with));
    assert!(!with.is_compatible(&plain));

    let mut everything = FilteredAccess::default();
    everything.write_all();
    assert!(!with.component_access().is_compatible(&everything));
}
