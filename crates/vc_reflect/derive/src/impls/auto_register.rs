use proc_macro2::TokenStream;

use crate::derive_data::ReflectStruct;

/// Generate `auto_register` implementation
#[cfg(feature = "auto_register")]
pub(crate) fn get_auto_register_impl(info: &ReflectStruct) -> TokenStream {
    use quote::quote_spanned;

    let Some(span) = info.attrs.auto_register else {
        return TokenStream::new();
    };

    let auto_register_ = crate::path::auto_register_();
    let typed_ = crate::path::typed_();
    let ident = info.ident;

    quote_spanned! { span =>
        #auto_register_::inventory::submit!{
            #auto_register_::AutoRegistration::new(
                <#ident as #typed_>::type_descriptor
            )
        }
    }
}

/// Generate `auto_register` implementation
#[cfg(not(feature = "auto_register"))]
pub(crate) fn get_auto_register_impl(_: &ReflectStruct) -> TokenStream {
    TokenStream::new()
}
