use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    DeriveInput, Expr, ExprPath, Ident, LitStr, Path, Result, Token,
    parse::{Parse, ParseStream},
    parse_macro_input,
    punctuated::Punctuated,
};

const HOOKS: [&str; 5] = ["on_add", "on_insert", "on_replace", "on_remove", "on_despawn"];

#[derive(Default)]
struct ComponentAttrs {
    sparse_set: bool,
    immutable: bool,
    clone_behavior: Option<Ident>,
    hooks: Vec<(&'static str, ExprPath)>,
}

/// One entry of `#[require(..)]`: a component type and an optional constructor expression.
struct Require {
    path: Path,
    constructor: Option<Expr>,
}

impl Parse for Require {
    fn parse(input: ParseStream) -> Result<Self> {
        let path = input.parse::<Path>()?;
        let constructor = if input.peek(Token![=]) {
            input.parse::<Token![=]>()?;
            Some(input.parse::<Expr>()?)
        } else {
            None
        };
        Ok(Self { path, constructor })
    }
}

pub fn derive_component(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    match expand(&ast) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(error) => TokenStream::from(error.to_compile_error()),
    }
}

fn expand(ast: &DeriveInput) -> Result<TokenStream2> {
    let attrs = parse_component_attrs(ast)?;
    let requires = parse_requires(ast)?;

    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let storage = if attrs.sparse_set {
        quote!(::rusty_ecs::component::StorageType::SparseSet)
    } else {
        quote!(::rusty_ecs::component::StorageType::Table)
    };
    let mutability = if attrs.immutable {
        quote!(::rusty_ecs::component::Immutable)
    } else {
        quote!(::rusty_ecs::component::Mutable)
    };

    let register_required = requires.iter().map(|Require { path, constructor }| {
        let constructor = constructor
            .as_ref()
            .map(|expr| quote!(|| -> #path { #expr }))
            .unwrap_or_else(|| quote!(<#path as ::core::default::Default>::default));
        quote! {
            required.register_required::<#path>(#constructor);
        }
    });
    let required_fn = (!requires.is_empty()).then(|| {
        quote! {
            fn register_required_components(
                _component_id: ::rusty_ecs::component::ComponentId,
                required: &mut ::rusty_ecs::component::RequiredComponentsRegistrator<'_, '_>,
            ) {
                #(#register_required)*
            }
        }
    });

    let hook_fns = attrs.hooks.iter().map(|(hook, path)| {
        let hook = Ident::new(hook, proc_macro2::Span::call_site());
        quote! {
            fn #hook() -> ::core::option::Option<::rusty_ecs::component::ComponentHook> {
                ::core::option::Option::Some(#path)
            }
        }
    });

    let clone_behavior_fn = attrs.clone_behavior.as_ref().map(|behavior| {
        quote! {
            fn clone_behavior() -> ::rusty_ecs::component::ComponentCloneBehavior {
                ::rusty_ecs::component::ComponentCloneBehavior::#behavior
            }
        }
    });

    // `::rusty_ecs` resolves inside the crate through `extern crate self as rusty_ecs;`.
    Ok(quote! {
        impl #impl_generics ::rusty_ecs::component::Component for #name #ty_generics #where_clause {
            const STORAGE_TYPE: ::rusty_ecs::component::StorageType = #storage;
            type Mutability = #mutability;

            #required_fn

            #(#hook_fns)*

            #clone_behavior_fn
        }
    })
}

fn parse_component_attrs(ast: &DeriveInput) -> Result<ComponentAttrs> {
    let mut attrs = ComponentAttrs::default();
    for attr in ast.attrs.iter().filter(|attr| attr.path().is_ident("component")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("storage") {
                let storage = meta.value()?.parse::<LitStr>()?;
                match storage.value().as_str() {
                    "Table" => attrs.sparse_set = false,
                    "SparseSet" => attrs.sparse_set = true,
                    other => {
                        return Err(syn::Error::new_spanned(
                            storage,
                            format!("unknown storage `{other}`, expected `Table` or `SparseSet`"),
                        ));
                    }
                }
                return Ok(());
            }
            if meta.path.is_ident("immutable") {
                attrs.immutable = true;
                return Ok(());
            }
            if meta.path.is_ident("clone_behavior") {
                attrs.clone_behavior = Some(meta.value()?.parse::<Ident>()?);
                return Ok(());
            }
            if let Some(hook) = HOOKS.iter().find(|hook| meta.path.is_ident(hook)) {
                if attrs.hooks.iter().any(|(existing, _)| existing == hook) {
                    return Err(meta.error(format!("`{hook}` is set more than once")));
                }
                let path = meta.value()?.parse::<ExprPath>()?;
                attrs.hooks.push((*hook, path));
                return Ok(());
            }
            Err(meta.error("unknown component attribute"))
        })?;
    }
    Ok(attrs)
}

fn parse_requires(ast: &DeriveInput) -> Result<Vec<Require>> {
    let mut requires = Vec::new();
    for attr in ast.attrs.iter().filter(|attr| attr.path().is_ident("require")) {
        let parsed =
            attr.parse_args_with(Punctuated::<Require, Token![,]>::parse_terminated)?;
        requires.extend(parsed);
    }
    Ok(requires)
}
