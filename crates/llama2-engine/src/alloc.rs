// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fallible buffer allocation with size diagnostics.

use launcher::EngineError;

/// Allocates a zero-initialized buffer of `len` elements.
///
/// Thin wrapper over the global allocator that traces the requested size
/// and turns allocator refusal into [`EngineError::AllocationFailed`]
/// instead of aborting. Every working buffer the engine owns goes through
/// here.
pub fn buffer<T: Clone + Default>(len: usize) -> Result<Vec<T>, EngineError> {
    let bytes = len.saturating_mul(std::mem::size_of::<T>());
    tracing::trace!("allocating {} bytes", bytes);

    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| EngineError::AllocationFailed(bytes))?;
    buffer.resize(len, T::default());
    Ok(buffer)
}
