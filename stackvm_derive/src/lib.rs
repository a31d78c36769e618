//! Derive macros for the stackvm crate.
//!
//! Provides:
//! - `#[derive(Error)]` - `Display` and `std::error::Error` from `#[error("...")]` messages
//! - `#[derive(ToStatus)]` - mapping of error variants onto the VM status codes

mod error;
mod status;

use proc_macro::TokenStream;

/// Implements `Display` and `Error` for error enums and structs.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}

/// Implements `ToStatus` from per-variant `#[status(...)]` attributes.
#[proc_macro_derive(ToStatus, attributes(status))]
pub fn derive_to_status(input: TokenStream) -> TokenStream {
    status::derive_to_status(input)
}
