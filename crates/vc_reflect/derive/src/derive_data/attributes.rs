use proc_macro2::Span;
use syn::meta::ParseNestedMeta;
use syn::spanned::Spanned;
use syn::{Attribute, LitInt, LitStr, Type};

use crate::REFLECT_ATTRIBUTE_NAME;

fn parse_int<N>(meta: &ParseNestedMeta) -> syn::Result<N>
where
    N: core::str::FromStr,
    N::Err: core::fmt::Display,
{
    let lit: LitInt = meta.value()?.parse()?;
    lit.base10_parse()
}

fn set_once<T>(slot: &mut Option<T>, value: T, meta: &ParseNestedMeta) -> syn::Result<()> {
    if slot.is_some() {
        return Err(meta.error("duplicate attribute"));
    }
    *slot = Some(value);
    Ok(())
}

// -----------------------------------------------------------------------------
// TypeAttributes

/// Attributes on the type, `#[reflect(...)]` above the struct.
#[derive(Default)]
pub(crate) struct TypeAttributes {
    pub id: Option<u32>,
    pub name: Option<LitStr>,
    pub abstract_type: Option<Span>,
    pub auto_register: Option<Span>,
}

impl TypeAttributes {
    pub fn parse_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut this = Self::default();
        for attr in attrs {
            if !attr.path().is_ident(REFLECT_ATTRIBUTE_NAME) {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    let id = parse_int::<u32>(&meta)?;
                    set_once(&mut this.id, id, &meta)
                } else if meta.path.is_ident("name") {
                    let name: LitStr = meta.value()?.parse()?;
                    set_once(&mut this.name, name, &meta)
                } else if meta.path.is_ident("abstract_type") {
                    set_once(&mut this.abstract_type, meta.path.span(), &meta)
                } else if meta.path.is_ident("auto_register") {
                    set_once(&mut this.auto_register, meta.path.span(), &meta)
                } else {
                    Err(meta.error(
                        "unknown type attribute, expected `id`, `name`, `abstract_type` or `auto_register`",
                    ))
                }
            })?;
        }
        Ok(this)
    }
}

// -----------------------------------------------------------------------------
// FieldAttributes

/// Attributes on one field.
#[derive(Default)]
pub(crate) struct FieldAttributes {
    pub id: Option<u16>,
    pub skip: Option<Span>,
    pub base: Option<Span>,
    pub reflectable: Option<Span>,
    pub array: Option<Span>,
    pub weak: Option<Span>,
    pub skip_in_reference_search: Option<Span>,
    pub target: Option<Type>,
}

impl FieldAttributes {
    pub fn parse_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut this = Self::default();
        for attr in attrs {
            if !attr.path().is_ident(REFLECT_ATTRIBUTE_NAME) {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                let span = meta.path.span();
                if meta.path.is_ident("id") {
                    let id = parse_int::<u16>(&meta)?;
                    set_once(&mut this.id, id, &meta)
                } else if meta.path.is_ident("skip") {
                    set_once(&mut this.skip, span, &meta)
                } else if meta.path.is_ident("base") {
                    set_once(&mut this.base, span, &meta)
                } else if meta.path.is_ident("reflectable") {
                    set_once(&mut this.reflectable, span, &meta)
                } else if meta.path.is_ident("array") {
                    set_once(&mut this.array, span, &meta)
                } else if meta.path.is_ident("weak") {
                    set_once(&mut this.weak, span, &meta)
                } else if meta.path.is_ident("skip_in_reference_search") {
                    set_once(&mut this.skip_in_reference_search, span, &meta)
                } else if meta.path.is_ident("target") {
                    let target: Type = meta.value()?.parse()?;
                    set_once(&mut this.target, target, &meta)
                } else {
                    Err(meta.error("unknown field attribute"))
                }
            })?;
        }
        Ok(this)
    }
}
