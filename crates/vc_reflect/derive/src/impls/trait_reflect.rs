use proc_macro2::TokenStream;
use quote::quote;

use crate::derive_data::ReflectStruct;

pub(crate) fn impl_reflect(info: &ReflectStruct) -> TokenStream {
    let reflect_ = crate::path::reflect_();
    let typed_ = crate::path::typed_();
    let type_descriptor_ = crate::path::type_descriptor_();
    let option_ = crate::path::option_();
    let ident = info.ident;

    let base_methods = info.base.as_ref().map(|(field, _)| {
        quote! {
            #[inline]
            fn base(&self) -> #option_<&dyn #reflect_> {
                #option_::Some(&self.#field)
            }

            #[inline]
            fn base_mut(&mut self) -> #option_<&mut dyn #reflect_> {
                #option_::Some(&mut self.#field)
            }
        }
    });

    quote! {
        impl #reflect_ for #ident {
            #[inline]
            fn descriptor(&self) -> &'static #type_descriptor_ {
                <Self as #typed_>::type_descriptor()
            }

            #base_methods
        }
    }
}
