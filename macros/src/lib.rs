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

//! Derive macros for the ext2 driver crate.

#![deny(warnings)]

extern crate proc_macro;

mod any_repr;

use proc_macro::TokenStream;

/// Derives [`utils::repr::AnyRepr`] for a `#[repr(C)]` struct.
///
/// The struct must contain only plain old data: integers, arrays of them, and other
/// `AnyRepr` types. The macro does not itself check field types (that would require
/// resolving them), so getting this wrong is still an `unsafe` contract the caller takes on
/// by choosing to derive it, exactly as it would be by writing the `unsafe impl` by hand.
#[proc_macro_derive(AnyRepr)]
pub fn derive_any_repr(input: TokenStream) -> TokenStream {
	any_repr::derive(input)
}
