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

//! Small `no_std` primitives shared by the driver and its derive macros.
//!
//! This crate exists so the filesystem driver does not have to pull the standard library in,
//! and so the error vocabulary it propagates through is defined exactly once.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod errno;
pub mod limits;
pub mod math;
pub mod repr;
