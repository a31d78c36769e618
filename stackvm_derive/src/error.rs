//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations from
//! `#[error("...")]` attributes.
//!
//! # Usage
//!
//! ```ignore
//! use stackvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum PassError {
//!     #[error("unknown opcode {0:#04x}")]
//!     Opcode(u8),
//!
//!     #[error("read of {requested} bytes at {offset} overruns the chunk")]
//!     Overrun { offset: usize, requested: usize },
//!
//!     #[error("empty line")]
//!     Empty,
//! }
//! ```
//!
//! Only the fields a message actually references are bound, so messages may
//! mention any subset of a variant's fields.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Ident, LitStr, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Enum(data) => {
            let arms = data
                .variants
                .iter()
                .map(|variant| {
                    let message = message_of(&variant.attrs, &variant.ident)?;
                    let ident = &variant.ident;
                    Ok(display_arm(quote!(Self::#ident), &variant.fields, &message))
                })
                .collect::<syn::Result<Vec<_>>>()?;

            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(data) => {
            let message = message_of(&input.attrs, &input.ident)?;
            let arm = display_arm(quote!(Self), &data.fields, &message);
            quote! {
                match self {
                    #arm
                }
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Error derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Builds one `match` arm writing `message` for a variant (or struct) path.
fn display_arm(path: TokenStream2, fields: &Fields, message: &LitStr) -> TokenStream2 {
    let referenced = referenced_arguments(&message.value());

    match fields {
        Fields::Unit => quote! {
            #path => f.write_str(#message),
        },
        Fields::Named(named) => {
            let used: Vec<&Ident> = named
                .named
                .iter()
                .filter_map(|field| field.ident.as_ref())
                .filter(|ident| referenced.iter().any(|r| *ident == r))
                .collect();
            quote! {
                #path { #(#used,)* .. } => write!(f, #message, #(#used = #used),*),
            }
        }
        Fields::Unnamed(unnamed) => {
            let mut bindings = Vec::with_capacity(unnamed.unnamed.len());
            let mut used = Vec::new();
            for index in 0..unnamed.unnamed.len() {
                if referenced.iter().any(|r| *r == index.to_string()) {
                    let ident = format_ident!("f{}", index);
                    bindings.push(quote!(#ident));
                    used.push(ident);
                } else {
                    bindings.push(quote!(_));
                }
            }
            let rewritten = LitStr::new(&positional_to_named(&message.value()), message.span());
            quote! {
                #path(#(#bindings),*) => write!(f, #rewritten, #(#used = #used),*),
            }
        }
    }
}

/// Returns the `#[error("...")]` message among `attrs`.
fn message_of(attrs: &[Attribute], target: &Ident) -> syn::Result<LitStr> {
    let attr = attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                target,
                format!("`{target}` needs an #[error(\"...\")] attribute describing the failure"),
            )
        })?;

    attr.parse_args::<LitStr>().map_err(|_| {
        syn::Error::new_spanned(
            &attr.meta,
            "expected a string literal, e.g. #[error(\"bad operand {0}\")]",
        )
    })
}

/// Collects the argument names a format string references (`{name}`, `{0:?}`).
fn referenced_arguments(message: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = message.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '{' => {
                let mut arg = String::new();
                for c in chars.by_ref() {
                    if c == '}' || c == ':' {
                        break;
                    }
                    arg.push(c);
                }
                let arg = arg.trim().to_string();
                if !arg.is_empty() && !out.contains(&arg) {
                    out.push(arg);
                }
            }
            _ => {}
        }
    }

    out
}

/// Rewrites positional arguments `{0}`, `{1:?}` into `{f0}`, `{f1:?}`.
fn positional_to_named(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 8);
    let mut chars = message.chars().peekable();

    while let Some(c) = chars.next() {
        out.push(c);
        if c != '{' {
            continue;
        }
        if chars.peek() == Some(&'{') {
            out.push('{');
            chars.next();
            continue;
        }
        if chars.peek().is_some_and(|c| c.is_ascii_digit()) {
            out.push('f');
        }
    }

    out
}
