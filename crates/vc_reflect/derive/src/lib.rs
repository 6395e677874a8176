//! See following macros:
//!
//! - [`Reflect`]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::std_instead_of_core, reason = "proc-macro lib")]
#![allow(clippy::std_instead_of_alloc, reason = "proc-macro lib")]

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

static REFLECT_ATTRIBUTE_NAME: &str = "reflect";

// -----------------------------------------------------------------------------
// Modules

mod derive_data;
mod impls;
mod path;

// -----------------------------------------------------------------------------
// Macros

/// # Reflection Derivation
///
/// `#[derive(Reflect)]` implements `Typed` and `Reflect` for a struct with
/// named fields. The generated descriptor is built on first access and
/// cached in a static cell.
///
/// Generic structs are not supported.
///
/// ## Type Attributes
///
/// ```rust, ignore
/// #[derive(Reflect, Default)]
/// #[reflect(id = 1000, name = "Node", auto_register)]
/// struct Node { /* ... */ }
/// ```
///
/// - `id = N`: the numeric type id, required.
/// - `name = "..."`: the display name, defaults to the type's identifier.
/// - `abstract_type`: no factory is registered, so the type cannot be
///   instantiated by a decoder. Without it the type must implement `Default`.
/// - `auto_register`: submits the type for `TypeRegistry::auto_register`.
///
/// ## Field Attributes
///
/// Every field needs either `id`, `base` or `skip`.
///
/// - `id = N`: the stable 16-bit field id.
/// - `skip`: the field is not reflected.
/// - `base`: the field holds the base-class part. At most one per type.
/// - `reflectable`: the field embeds another reflected value by value.
/// - `array`: the field is a `Vec` of elements, each encoded on its own.
/// - `weak`: the reference is weak, see `FieldFlags::WEAK_REF`.
/// - `skip_in_reference_search`: ignored by dependency searches.
/// - `target = Type`: the type a reference field points at.
///
/// The field kind follows from the type when not given:
///
/// - `Option<ObjectRef>` is a reference, `Vec<Option<ObjectRef>>` a
///   reference array.
/// - `DataBlock` is a data block.
/// - Everything else is plain and must implement `PlainType`.
///
/// ```rust, ignore
/// #[derive(Reflect, Default)]
/// #[reflect(id = 7)]
/// struct Mesh {
///     #[reflect(base)]
///     asset: Asset,
///     #[reflect(id = 0, array)]
///     indices: Vec<u32>,
///     #[reflect(id = 1, reflectable)]
///     bounds: Aabb,
///     #[reflect(id = 2)]
///     vertices: DataBlock,
///     #[reflect(id = 3, weak, target = Material)]
///     material: Option<ObjectRef>,
///     #[reflect(skip)]
///     gpu_handle: u64,
/// }
/// ```
#[proc_macro_derive(Reflect, attributes(reflect))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let reflect_struct = match derive_data::ReflectStruct::from_derive_input(&ast) {
        Ok(info) => info,
        Err(err) => return err.into_compile_error().into(),
    };

    impls::impl_struct(&reflect_struct).into()
}
