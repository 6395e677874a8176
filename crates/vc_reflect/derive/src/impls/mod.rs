//! Code generation.

// -----------------------------------------------------------------------------
// Modules

mod auto_register;
mod trait_reflect;
mod trait_typed;

// -----------------------------------------------------------------------------
// Internal API

use proc_macro2::TokenStream;
use quote::quote;

use crate::derive_data::ReflectStruct;

pub(crate) fn impl_struct(info: &ReflectStruct) -> TokenStream {
    let typed_impl = trait_typed::impl_typed(info);
    let reflect_impl = trait_reflect::impl_reflect(info);
    let auto_register_impl = auto_register::get_auto_register_impl(info);

    quote! {
        #typed_impl

        #reflect_impl

        #auto_register_impl
    }
}
