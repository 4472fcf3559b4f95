mod component;
mod resource;

use proc_macro::TokenStream;

/// Implement `Component`.
///
/// - `#[component(storage = "SparseSet")]` stores the component in a sparse set.
/// - `#[component(immutable)]` forbids mutable access after insertion.
/// - `#[component(on_add = path, on_insert = path, on_replace = path, on_remove = path,
///   on_despawn = path)]` installs lifecycle hooks.
/// - `#[component(clone_behavior = Ignore)]` leaves the component off entity clones.
/// - `#[require(A, B = expr)]` requires `A` built with `Default`, and `B` built with `expr`.
#[proc_macro_derive(Component, attributes(component, require))]
pub fn derive_component(item: TokenStream) -> TokenStream {
    component::derive_component(item)
}

#[proc_macro_derive(Resource)]
pub fn derive_resource(item: TokenStream) -> TokenStream {
    resource::derive_resource(item)
}
