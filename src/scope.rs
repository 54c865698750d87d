//! Nested lexical scopes stored in an arena.
//!
//! Frames refer to their parent through an integer handle instead of a
//! reference, so the chain has no ownership cycles. Frames follow a strict
//! stack discipline: `push` opens a child of the current frame, `pop`
//! discards the current frame and returns to its parent.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use log::trace;

/// Handle of a frame inside a `ScopeArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScopeId(usize);

#[derive(Debug)]
struct Frame<T> {
  parent: Option<ScopeId>,
  symbols: HashMap<String, T>,
}

impl<T> Frame<T> {
  fn new(parent: Option<ScopeId>) -> Self {
    Self {
      parent,
      symbols: HashMap::new(),
    }
  }
}

/// Chain of frames mapping names to per-pass metadata `T`.
#[derive(Debug)]
pub struct ScopeArena<T> {
  frames: Vec<Frame<T>>,
  current: ScopeId,
}

impl<T> Default for ScopeArena<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> ScopeArena<T> {
  /// An arena holding only the root frame.
  pub fn new() -> Self {
    Self {
      frames: vec![Frame::new(None)],
      current: ScopeId(0),
    }
  }

  /// Number of frames between the current one and the root, inclusive.
  fn depth(&self) -> usize {
    self.frames.len()
  }

  /// Open a child of the current frame and make it current.
  pub fn push(&mut self) {
    let id = ScopeId(self.frames.len());
    self.frames.push(Frame::new(Some(self.current)));
    self.current = id;
    trace!("entered scope {} (depth {})", id.0, self.depth());
  }

  /// Discard the current frame. The root frame is never popped; returns
  /// `false` if that was attempted.
  pub fn pop(&mut self) -> bool {
    let Some(parent) = self.frames[self.current.0].parent else {
      return false;
    };
    self.frames.pop();
    trace!("left scope {}", self.current.0);
    self.current = parent;
    true
  }

  /// Declare `name` in the current frame. Returns `false` if the frame
  /// already holds that name; outer frames may hold it (shadowing).
  pub fn declare(&mut self, name: &str, value: T) -> bool {
    match self.frames[self.current.0].symbols.entry(name.to_string()) {
      Entry::Occupied(_) => false,
      Entry::Vacant(slot) => {
        slot.insert(value);
        true
      }
    }
  }

  /// Resolve `name`, walking from the current frame out to the root.
  pub fn lookup(&self, name: &str) -> Option<&T> {
    let mut id = Some(self.current);
    while let Some(ScopeId(index)) = id {
      let frame = &self.frames[index];
      if let Some(value) = frame.symbols.get(name) {
        return Some(value);
      }
      id = frame.parent;
    }
    None
  }
}
