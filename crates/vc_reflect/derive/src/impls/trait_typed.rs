use proc_macro2::TokenStream;
use quote::quote;

use crate::derive_data::{FieldKind, ReflectStruct, StructField};

fn field_expression(field: &StructField) -> TokenStream {
    let field_descriptor_ = crate::path::field_descriptor_();
    let field_flags_ = crate::path::field_flags_();

    let ident = &field.ident;
    let id = field.id;
    let name = ident.to_string();
    let get = quote! { |v| &v.#ident };
    let get_mut = quote! { |v| &mut v.#ident };

    let constructor = match &field.kind {
        FieldKind::Plain { array: false, element } => {
            quote! { #field_descriptor_::plain::<Self, #element> }
        }
        FieldKind::Plain { array: true, element } => {
            quote! { #field_descriptor_::plain_array::<Self, #element> }
        }
        FieldKind::Reflectable { array: false, element } => {
            quote! { #field_descriptor_::reflectable::<Self, #element> }
        }
        FieldKind::Reflectable { array: true, element } => {
            quote! { #field_descriptor_::reflectable_array::<Self, #element> }
        }
        FieldKind::ReflectablePtr { array: false } => {
            quote! { #field_descriptor_::reflectable_ptr::<Self> }
        }
        FieldKind::ReflectablePtr { array: true } => {
            quote! { #field_descriptor_::reflectable_ptr_array::<Self> }
        }
        FieldKind::DataBlock => quote! { #field_descriptor_::data_block::<Self> },
    };

    let mut tail = TokenStream::new();
    if field.attrs.weak.is_some() {
        tail.extend(quote! { .weak() });
    }
    if field.attrs.skip_in_reference_search.is_some() {
        tail.extend(quote! { .with_flags(#field_flags_::SKIP_IN_REFERENCE_SEARCH) });
    }
    if let Some(target) = &field.attrs.target {
        tail.extend(quote! { .with_target::<#target>() });
    }

    quote! {
        .field(#constructor(#id, #name, #get, #get_mut) #tail)
    }
}

pub(crate) fn impl_typed(info: &ReflectStruct) -> TokenStream {
    let typed_ = crate::path::typed_();
    let type_descriptor_ = crate::path::type_descriptor_();
    let descriptor_cell_ = crate::path::descriptor_cell_();

    let ident = info.ident;
    let id = info.id;
    let name = &info.name;

    let base = info.base.as_ref().map(|(_, ty)| quote! { .base::<#ty>() });
    let fields = info.fields.iter().map(field_expression);
    let factory = if info.attrs.abstract_type.is_some() {
        None
    } else {
        Some(quote! { .with_factory() })
    };

    quote! {
        impl #typed_ for #ident {
            fn type_descriptor() -> &'static #type_descriptor_ {
                static CELL: #descriptor_cell_ = #descriptor_cell_::new();
                CELL.get_or_init(|| {
                    #type_descriptor_::builder::<Self>(#id, #name)
                        #base
                        #(#fields)*
                        #factory
                        .build()
                })
            }
        }
    }
}
