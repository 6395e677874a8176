//! This independent module is used to provide the required path.
//! So as to minimize changes when the `vc_reflect` structure is modified.

use proc_macro2::TokenStream;
use quote::quote;

// -----------------------------------------------------------------------------
// Crate Path

/// The access path of the `vc_reflect` crate.
///
/// `vc_reflect` declares `extern crate self as vc_reflect`, so the path is
/// also valid inside the crate itself.
#[inline(always)]
pub(crate) fn vc_reflect() -> TokenStream {
    quote! { ::vc_reflect }
}

// -----------------------------------------------------------------------------
// Internal API

#[inline(always)]
pub(crate) fn reflect_() -> TokenStream {
    let vc_reflect = vc_reflect();
    quote! { #vc_reflect::Reflect }
}

#[inline(always)]
pub(crate) fn typed_() -> TokenStream {
    let vc_reflect = vc_reflect();
    quote! { #vc_reflect::Typed }
}

#[inline(always)]
pub(crate) fn type_descriptor_() -> TokenStream {
    let vc_reflect = vc_reflect();
    quote! { #vc_reflect::descriptor::TypeDescriptor }
}

#[inline(always)]
pub(crate) fn descriptor_cell_() -> TokenStream {
    let vc_reflect = vc_reflect();
    quote! { #vc_reflect::descriptor::DescriptorCell }
}

#[inline(always)]
pub(crate) fn field_descriptor_() -> TokenStream {
    let vc_reflect = vc_reflect();
    quote! { #vc_reflect::descriptor::FieldDescriptor }
}

#[inline(always)]
pub(crate) fn field_flags_() -> TokenStream {
    let vc_reflect = vc_reflect();
    quote! { #vc_reflect::descriptor::FieldFlags }
}

#[cfg(feature = "auto_register")]
#[inline(always)]
pub(crate) fn auto_register_() -> TokenStream {
    let vc_reflect = vc_reflect();
    quote! { #vc_reflect::__macro_exports::auto_register }
}

#[inline(always)]
pub(crate) fn option_() -> TokenStream {
    quote! { ::core::option::Option }
}
