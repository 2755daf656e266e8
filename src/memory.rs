//! Linear arena allocation over the engine's persistent memory block.
//!
//! The host owns one [`PersistentMemory`] block for the lifetime of the process
//! and keeps it alive across game module reloads. Long-lived engine objects
//! (mesh vertex and index data, mostly) are carved out of it with
//! [`MemoryArena::push_memory`]; nothing is ever freed individually.
//!
//! Arenas are bookkeeping only: a [`MemoryArena`] describes a window
//! `[base, base + size)` of the block and how much of it is used. Sub-arenas
//! are carved from a parent with [`MemoryArena::sub_arena`].
//!
//! # Example
//! ```
//! use epsilon::memory::MemoryArena;
//!
//! let mut arena = MemoryArena::new(100, 0);
//! assert_eq!(arena.push_memory(40).unwrap().offset, 0);
//! assert_eq!(arena.push_memory(40).unwrap().offset, 40);
//! assert!(arena.push_memory(40).is_err());
//! assert_eq!(arena.used(), 80);
//! ```

use std::{mem::size_of, ops::Range};

use bytemuck::Pod;

use crate::error::ArenaError;

/// A byte range handed out by an arena, relative to the start of the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaAllocation {
  /// Absolute offset into the backing block.
  pub offset: usize,
  /// Length in bytes.
  pub len:    usize,
}

impl ArenaAllocation {
  pub fn range(&self) -> Range<usize> {
    self.offset..self.offset + self.len
  }
}

/// A linear, non-freeing allocator over a window of the persistent block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryArena {
  base: usize,
  size: usize,
  used: usize,
}

impl MemoryArena {
  /// Creates an arena of `size` bytes starting at offset `base`.
  pub fn new(size: usize, base: usize) -> Self {
    Self { base, size, used: 0 }
  }

  pub fn base(&self) -> usize {
    self.base
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub fn used(&self) -> usize {
    self.used
  }

  pub fn remaining(&self) -> usize {
    self.size - self.used
  }

  /// Reserves `size` bytes at `base + used`.
  ///
  /// Fails without touching `used` when the request does not fit.
  pub fn push_memory(&mut self, size: usize) -> Result<ArenaAllocation, ArenaError> {
    let fits = self
      .used
      .checked_add(size)
      .is_some_and(|end| end <= self.size);

    if !fits {
      return Err(ArenaError::OutOfMemory {
        requested: size,
        used:      self.used,
        size:      self.size,
      });
    }

    let allocation = ArenaAllocation {
      offset: self.base + self.used,
      len:    size,
    };
    self.used += size;

    Ok(allocation)
  }

  /// Reserves room for one `T`.
  pub fn push_struct<T>(&mut self) -> Result<ArenaAllocation, ArenaError> {
    self.push_memory(size_of::<T>())
  }

  /// Reserves room for `count` values of `T`.
  pub fn push_array<T>(&mut self, count: usize) -> Result<ArenaAllocation, ArenaError> {
    let stride = size_of::<T>();
    let bytes = count
      .checked_mul(stride)
      .ok_or(ArenaError::SizeOverflow { count, stride })?;
    self.push_memory(bytes)
  }

  /// Carves a child arena of `size` bytes out of this one.
  pub fn sub_arena(&mut self, size: usize) -> Result<MemoryArena, ArenaError> {
    let allocation = self.push_memory(size)?;
    Ok(MemoryArena::new(allocation.len, allocation.offset))
  }
}

/// The process-lifetime memory block and its root arena.
pub struct PersistentMemory {
  block:     Box<[u8]>,
  permanent: MemoryArena,
}

impl PersistentMemory {
  /// Allocates a zeroed block of `size` bytes.
  pub fn new(size: usize) -> Self {
    Self {
      block:     vec![0u8; size].into_boxed_slice(),
      permanent: MemoryArena::new(size, 0),
    }
  }

  pub fn size(&self) -> usize {
    self.block.len()
  }

  /// The root arena covering the whole block.
  pub fn permanent(&mut self) -> &mut MemoryArena {
    &mut self.permanent
  }

  pub fn permanent_used(&self) -> usize {
    self.permanent.used()
  }

  /// Allocates `data.len()` values from `arena` and copies `data` in.
  ///
  /// `arena` must have been carved from this block.
  pub fn write_slice<T: Pod>(
    &mut self,
    arena: &mut MemoryArena,
    data: &[T],
  ) -> Result<ArenaAllocation, ArenaError> {
    let allocation = arena.push_array::<T>(data.len())?;
    self.block[allocation.range()].copy_from_slice(bytemuck::cast_slice(data));
    Ok(allocation)
  }

  pub fn bytes(&self, allocation: ArenaAllocation) -> &[u8] {
    &self.block[allocation.range()]
  }

  /// Copies an allocation back out as `T`s.
  ///
  /// Arena placement is unaligned, so this always copies.
  pub fn read_slice<T: Pod>(&self, allocation: ArenaAllocation) -> Vec<T> {
    bytemuck::pod_collect_to_vec(self.bytes(allocation))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn third_push_past_capacity_fails_without_mutating() {
    let mut arena = MemoryArena::new(100, 0);

    let first = arena.push_memory(40).unwrap();
    let second = arena.push_memory(40).unwrap();
    assert_eq!(first.offset, 0);
    assert_eq!(second.offset, 40);

    let third = arena.push_memory(40);
    assert_eq!(
      third,
      Err(ArenaError::OutOfMemory {
        requested: 40,
        used:      80,
        size:      100,
      })
    );
    assert_eq!(arena.used(), 80);
    assert_eq!(arena.remaining(), 20);
  }

  #[test]
  fn offsets_increase_and_never_overlap() {
    let sizes = [1usize, 7, 0, 13, 64, 3, 12];
    let mut arena = MemoryArena::new(sizes.iter().sum(), 16);

    let mut previous_end = 16;
    for size in sizes {
      let allocation = arena.push_memory(size).unwrap();
      assert_eq!(allocation.offset, previous_end);
      previous_end = allocation.range().end;
    }

    assert_eq!(arena.used(), arena.size());
    assert!(arena.push_memory(1).is_err());
    assert!(arena.push_memory(0).is_ok());
  }

  #[test]
  fn huge_requests_do_not_wrap() {
    let mut arena = MemoryArena::new(64, 0);
    arena.push_memory(8).unwrap();
    assert!(arena.push_memory(usize::MAX).is_err());
    assert!(matches!(
      arena.push_array::<u64>(usize::MAX / 4),
      Err(ArenaError::SizeOverflow { stride: 8, .. })
    ));
    assert_eq!(arena.used(), 8);
  }

  #[test]
  fn sub_arena_lives_inside_parent() {
    let mut permanent = MemoryArena::new(1024, 0);
    permanent.push_struct::<[u32; 4]>().unwrap();

    let mut assets = permanent.sub_arena(256).unwrap();
    assert_eq!(assets.base(), 16);
    assert_eq!(permanent.used(), 16 + 256);

    let allocation = assets.push_memory(256).unwrap();
    assert_eq!(allocation.offset, 16);
    assert!(assets.push_memory(1).is_err());
  }

  #[test]
  fn slices_round_trip_through_the_block() {
    let mut memory = PersistentMemory::new(128);
    let mut assets = memory.permanent().sub_arena(96).unwrap();

    // Misalign on purpose.
    assets.push_memory(3).unwrap();
    let data = [1.5f32, -2.0, 3.25];
    let allocation = memory.write_slice(&mut assets, &data).unwrap();

    assert_eq!(allocation.offset, 3);
    assert_eq!(allocation.len, 12);
    assert_eq!(memory.read_slice::<f32>(allocation), data);
    assert_eq!(memory.permanent_used(), 96);
  }
}
