//! Derive macro mapping error variants onto VM status codes.
//!
//! Every variant carries a `#[status(...)]` attribute:
//! - `#[status(CodeOverflow)]` maps the variant to a fixed status.
//! - `#[status(from = field)]` delegates to a field that itself implements
//!   `ToStatus` (a nested error, or a status value).
//!
//! The generated impl targets `crate::virtual_machine::status`, so the derive is
//! only meant to be used inside the stackvm crate.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, Ident, Member, Token, parse_macro_input};

mod kw {
    syn::custom_keyword!(from);
}

/// Parsed contents of one `#[status(...)]` attribute.
enum StatusAttr {
    Fixed(Ident),
    From(Member),
}

pub fn derive_to_status(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "ToStatus can only be derived for enums",
        ));
    };

    let arms = data
        .variants
        .iter()
        .map(|variant| {
            let ident = &variant.ident;
            match parse_status(&variant.attrs, ident)? {
                StatusAttr::Fixed(status) => Ok(quote! {
                    Self::#ident { .. } => crate::virtual_machine::status::Status::#status,
                }),
                StatusAttr::From(member) => delegate_arm(ident, &variant.fields, &member),
            }
        })
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics crate::virtual_machine::status::ToStatus for #name #ty_generics #where_clause {
            fn status(&self) -> crate::virtual_machine::status::Status {
                match self {
                    #(#arms)*
                }
            }
        }
    })
}

fn delegate_arm(variant: &Ident, fields: &Fields, member: &Member) -> syn::Result<TokenStream2> {
    let binding = quote::format_ident!("__status_source");
    let pattern = match (fields, member) {
        (Fields::Named(_), Member::Named(field)) => quote!(Self::#variant { #field: #binding, .. }),
        (Fields::Unnamed(unnamed), Member::Unnamed(index)) => {
            let position = index.index as usize;
            if position >= unnamed.unnamed.len() {
                return Err(syn::Error::new_spanned(
                    member,
                    format!("`{variant}` has no field {position}"),
                ));
            }
            let slots = (0..unnamed.unnamed.len()).map(|i| {
                if i == position {
                    quote!(#binding)
                } else {
                    quote!(_)
                }
            });
            quote!(Self::#variant(#(#slots),*))
        }
        _ => {
            return Err(syn::Error::new_spanned(
                member,
                format!("`{variant}` has no field matching this #[status(from = ...)]"),
            ));
        }
    };

    Ok(quote! {
        #pattern => crate::virtual_machine::status::ToStatus::status(#binding),
    })
}

fn parse_status(attrs: &[Attribute], variant: &Ident) -> syn::Result<StatusAttr> {
    let attr = attrs
        .iter()
        .find(|attr| attr.path().is_ident("status"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                variant,
                format!("variant `{variant}` needs a #[status(...)] attribute"),
            )
        })?;

    attr.parse_args_with(|input: syn::parse::ParseStream| {
        if input.peek(kw::from) {
            input.parse::<kw::from>()?;
            input.parse::<Token![=]>()?;
            Ok(StatusAttr::From(input.parse::<Member>()?))
        } else {
            Ok(StatusAttr::Fixed(input.parse::<Ident>()?))
        }
    })
}
