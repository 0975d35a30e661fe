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

//! Mutually exclusive access primitive based on a spinlock.
//!
//! The driver itself is single-threaded by design, but a hosting kernel may still reach a
//! mounted filesystem from more than one execution context (an interrupt handler flushing
//! writeback, a second thread before the scheduler has partitioned work). [`Spin`] is the
//! single coarse-grained guard that serializes those entries; nothing inside the driver's
//! algorithms assumes more concurrency than "one holder at a time".

use core::{
	cell::UnsafeCell,
	fmt::{self, Formatter},
	hint,
	ops::{Deref, DerefMut},
	sync::atomic::{
		AtomicBool,
		Ordering::{Acquire, Release},
	},
};

#[inline(always)]
fn lock(flag: &AtomicBool) {
	while flag.swap(true, Acquire) {
		hint::spin_loop();
	}
}

/// Unlocks the associated [`Spin`] when dropped.
pub struct SpinGuard<'m, T: ?Sized> {
	spin: &'m Spin<T>,
}

impl<T: ?Sized> Deref for SpinGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { &*self.spin.data.get() }
	}
}

impl<T: ?Sized> DerefMut for SpinGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { &mut *self.spin.data.get() }
	}
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SpinGuard<'_, T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.deref(), f)
	}
}

impl<T: ?Sized> Drop for SpinGuard<'_, T> {
	fn drop(&mut self) {
		self.spin.flag.store(false, Release);
	}
}

/// Wraps a value so it can be accessed by only one execution context at a time.
pub struct Spin<T: ?Sized> {
	flag: AtomicBool,
	data: UnsafeCell<T>,
}

impl<T> Spin<T> {
	/// Creates a new instance wrapping `data`.
	pub const fn new(data: T) -> Self {
		Self {
			flag: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}

	/// Acquires the lock, consumes it, and returns the inner value.
	pub fn into_inner(self) -> T {
		self.data.into_inner()
	}
}

impl<T: ?Sized> Spin<T> {
	/// Acquires the spinlock, blocking until it becomes available.
	pub fn lock(&self) -> SpinGuard<T> {
		lock(&self.flag);
		SpinGuard {
			spin: self,
		}
	}
}

unsafe impl<T: ?Sized + Send> Sync for Spin<T> {}
unsafe impl<T: ?Sized + Send> Send for Spin<T> {}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Spin<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.lock(), f)
	}
}
