use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Fields, GenericArgument, Ident, LitStr, PathArguments, Type};

use super::{FieldAttributes, TypeAttributes};

// -----------------------------------------------------------------------------
// Type inspection

/// Returns the single generic argument of `ty` if its last path segment is `name`.
fn generic_arg<'a>(ty: &'a Type, name: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != name {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    match args.args.first()? {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    }
}

fn is_named(ty: &Type, name: &str) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == name && s.arguments.is_none()),
        _ => false,
    }
}

fn is_object_ref_option(ty: &Type) -> bool {
    generic_arg(ty, "Option").is_some_and(|inner| is_named(inner, "ObjectRef"))
}

// -----------------------------------------------------------------------------
// FieldKind

pub(crate) enum FieldKind {
    /// `F: PlainType`, or `Vec<F>` as an array.
    Plain { array: bool, element: Type },
    /// `F: Typed`, or `Vec<F>` as an array.
    Reflectable { array: bool, element: Type },
    /// `Option<ObjectRef>` or `Vec<Option<ObjectRef>>`.
    ReflectablePtr { array: bool },
    DataBlock,
}

// -----------------------------------------------------------------------------
// StructField

pub(crate) struct StructField {
    pub ident: Ident,
    pub id: u16,
    pub kind: FieldKind,
    pub attrs: FieldAttributes,
}

impl StructField {
    fn element_of(ty: &Type, array: bool) -> syn::Result<Type> {
        if !array {
            return Ok(ty.clone());
        }
        generic_arg(ty, "Vec")
            .cloned()
            .ok_or_else(|| syn::Error::new(ty.span(), "array fields must be of type `Vec<_>`"))
    }

    fn new(ident: Ident, ty: &Type, id: u16, attrs: FieldAttributes) -> syn::Result<Self> {
        let ptr_array = generic_arg(ty, "Vec").is_some_and(is_object_ref_option);
        let ptr = ptr_array || is_object_ref_option(ty);
        let array = attrs.array.is_some() || ptr_array;

        let kind = if ptr {
            if let Some(span) = attrs.reflectable {
                return Err(syn::Error::new(span, "reference fields cannot be `reflectable`"));
            }
            FieldKind::ReflectablePtr { array }
        } else if attrs.reflectable.is_some() {
            FieldKind::Reflectable {
                array,
                element: Self::element_of(ty, array)?,
            }
        } else if is_named(ty, "DataBlock") {
            if let Some(span) = attrs.array {
                return Err(syn::Error::new(span, "data block fields cannot be arrays"));
            }
            FieldKind::DataBlock
        } else {
            FieldKind::Plain {
                array,
                element: Self::element_of(ty, array)?,
            }
        };

        if !matches!(kind, FieldKind::ReflectablePtr { .. }) {
            let misplaced = attrs
                .weak
                .or(attrs.skip_in_reference_search)
                .or(attrs.target.as_ref().map(Spanned::span));
            if let Some(span) = misplaced {
                return Err(syn::Error::new(
                    span,
                    "`weak`, `skip_in_reference_search` and `target` apply to reference fields only",
                ));
            }
        }

        Ok(Self {
            ident,
            id,
            kind,
            attrs,
        })
    }
}

// -----------------------------------------------------------------------------
// ReflectStruct

pub(crate) struct ReflectStruct<'a> {
    pub ident: &'a Ident,
    pub id: u32,
    pub name: LitStr,
    pub attrs: TypeAttributes,
    /// Field holding the base-class part and its type.
    pub base: Option<(Ident, Type)>,
    pub fields: Vec<StructField>,
}

impl<'a> ReflectStruct<'a> {
    pub fn from_derive_input(input: &'a DeriveInput) -> syn::Result<Self> {
        let Data::Struct(data) = &input.data else {
            return Err(syn::Error::new(
                input.ident.span(),
                "`Reflect` can only be derived for structs",
            ));
        };
        let Fields::Named(named) = &data.fields else {
            return Err(syn::Error::new(
                data.fields.span(),
                "`Reflect` requires named fields",
            ));
        };
        if !input.generics.params.is_empty() {
            return Err(syn::Error::new(
                input.generics.span(),
                "`Reflect` cannot be derived for generic types",
            ));
        }

        let attrs = TypeAttributes::parse_attrs(&input.attrs)?;
        let Some(id) = attrs.id else {
            return Err(syn::Error::new(
                input.ident.span(),
                "missing `#[reflect(id = ...)]` on the type",
            ));
        };
        let name = attrs
            .name
            .clone()
            .unwrap_or_else(|| LitStr::new(&input.ident.to_string(), input.ident.span()));

        let mut base = None;
        let mut fields: Vec<StructField> = Vec::new();
        for field in &named.named {
            let field_attrs = FieldAttributes::parse_attrs(&field.attrs)?;
            let Some(ident) = field.ident.clone() else {
                continue;
            };
            if field_attrs.skip.is_some() {
                continue;
            }
            if let Some(span) = field_attrs.base {
                if base.is_some() {
                    return Err(syn::Error::new(span, "a type can only have one `base` field"));
                }
                if field_attrs.id.is_some() {
                    return Err(syn::Error::new(span, "`base` fields take no `id`"));
                }
                base = Some((ident, field.ty.clone()));
                continue;
            }
            let Some(field_id) = field_attrs.id else {
                return Err(syn::Error::new(
                    ident.span(),
                    "missing `#[reflect(id = ...)]`, use `#[reflect(skip)]` to exclude the field",
                ));
            };
            if fields.iter().any(|f| f.id == field_id) {
                return Err(syn::Error::new(
                    ident.span(),
                    format!("field id {field_id} is used twice"),
                ));
            }
            fields.push(StructField::new(ident, &field.ty, field_id, field_attrs)?);
        }

        Ok(Self {
            ident: &input.ident,
            id,
            name,
            attrs,
            base,
            fields,
        })
    }
}
