/*
 * Copyright 2024 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, parse_macro_input};

pub fn derive(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	let name = &input.ident;
	if !matches!(input.data, Data::Struct(_)) {
		return syn::Error::new_spanned(name, "AnyRepr can only be derived for structs")
			.to_compile_error()
			.into();
	}
	let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
	let expanded = quote! {
		unsafe impl #impl_generics ::utils::repr::AnyRepr for #name #ty_generics #where_clause {}
	};
	expanded.into()
}
