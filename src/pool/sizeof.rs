//! SizeOf Engine Module
//!
//! Estimates how many pool units an entry consumes. Byte pools measure
//! retained size with [`SizeOfEngine::Deep`] or fixed sizes with
//! [`SizeOfEngine::Constant`]; count pools charge one unit per entry with
//! [`SizeOfEngine::Unit`].

use std::collections::HashMap;
use std::mem;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

// == Constants ==
/// Default maximum number of references followed while sizing a value
pub const DEFAULT_MAX_SIZEOF_DEPTH: usize = 1000;

// == SizeOf Error ==
/// Raised when a value cannot be measured.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeOfError {
    /// The object graph is deeper than the configured limit
    #[error("maximum sizing depth of {max_depth} exceeded")]
    DepthExceeded { max_depth: usize },
}

// == Size Walker ==
/// Tracks traversal depth while measuring a value graph.
#[derive(Debug)]
pub struct SizeWalker {
    max_depth: usize,
    depth: usize,
    abort_on_exceeded: bool,
    truncated: bool,
}

impl SizeWalker {
    pub fn new(max_depth: usize, abort_on_exceeded: bool) -> Self {
        Self {
            max_depth,
            depth: 0,
            abort_on_exceeded,
            truncated: false,
        }
    }

    /// Returns the heap bytes owned by `value`, one level deeper.
    ///
    /// When the depth limit is hit the walker either aborts or stops
    /// descending and reports zero for the rest of that branch.
    pub fn child<T: SizeOf + ?Sized>(&mut self, value: &T) -> Result<usize, SizeOfError> {
        if self.depth >= self.max_depth {
            if self.abort_on_exceeded {
                return Err(SizeOfError::DepthExceeded {
                    max_depth: self.max_depth,
                });
            }
            self.truncated = true;
            return Ok(0);
        }
        self.depth += 1;
        let size = value.heap_size(self);
        self.depth -= 1;
        size
    }

    /// True if some branch was cut short by the depth limit.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

// == SizeOf Trait ==
/// Values that can report their retained size.
///
/// `heap_size` returns only the bytes owned behind pointers; the inline
/// part is accounted by the container (or by [`deep_size_of`]).
pub trait SizeOf {
    fn heap_size(&self, walker: &mut SizeWalker) -> Result<usize, SizeOfError>;
}

/// Inline size plus everything reachable from `value`.
pub fn deep_size_of<T: SizeOf>(value: &T, walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
    Ok(mem::size_of::<T>() + walker.child(value)?)
}

macro_rules! flat_size_of {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SizeOf for $ty {
                #[inline]
                fn heap_size(&self, _walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
                    Ok(0)
                }
            }
        )*
    };
}

flat_size_of!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64
);

// Static strings are shared flyweights; the entry only pays for the pointer.
impl SizeOf for &'static str {
    fn heap_size(&self, _walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
        Ok(0)
    }
}

impl SizeOf for String {
    fn heap_size(&self, _walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
        Ok(self.capacity())
    }
}

impl<T: SizeOf> SizeOf for Vec<T> {
    fn heap_size(&self, walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
        let mut total = self.capacity() * mem::size_of::<T>();
        for item in self {
            total += walker.child(item)?;
        }
        Ok(total)
    }
}

impl<T: SizeOf> SizeOf for Option<T> {
    fn heap_size(&self, walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
        match self {
            Some(inner) => walker.child(inner),
            None => Ok(0),
        }
    }
}

impl<T: SizeOf> SizeOf for Box<T> {
    fn heap_size(&self, walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
        Ok(mem::size_of::<T>() + walker.child(self.as_ref())?)
    }
}

impl<T: SizeOf> SizeOf for Arc<T> {
    fn heap_size(&self, walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
        // two reference counters precede the payload
        Ok(2 * mem::size_of::<usize>() + mem::size_of::<T>() + walker.child(self.as_ref())?)
    }
}

impl<A: SizeOf, B: SizeOf> SizeOf for (A, B) {
    fn heap_size(&self, walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
        Ok(walker.child(&self.0)? + walker.child(&self.1)?)
    }
}

impl<A: SizeOf, B: SizeOf, C: SizeOf> SizeOf for (A, B, C) {
    fn heap_size(&self, walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
        Ok(walker.child(&self.0)? + walker.child(&self.1)? + walker.child(&self.2)?)
    }
}

impl<K: SizeOf, V: SizeOf, S> SizeOf for HashMap<K, V, S> {
    fn heap_size(&self, walker: &mut SizeWalker) -> Result<usize, SizeOfError> {
        let mut total = self.capacity() * (mem::size_of::<K>() + mem::size_of::<V>());
        for (key, value) in self {
            total += walker.child(key)?;
            total += walker.child(value)?;
        }
        Ok(total)
    }
}

// == SizeOf Engine ==
/// The closed set of sizing strategies a pool can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeOfEngine {
    /// Every entry costs exactly one unit (entry-count pools)
    Unit,
    /// Fixed byte sizes for key, value and container
    Constant { key: u64, value: u64, container: u64 },
    /// Walks the key and value graphs up to `max_depth`
    Deep {
        max_depth: usize,
        abort_on_depth_exceeded: bool,
    },
}

impl Default for SizeOfEngine {
    fn default() -> Self {
        SizeOfEngine::Deep {
            max_depth: DEFAULT_MAX_SIZEOF_DEPTH,
            abort_on_depth_exceeded: false,
        }
    }
}

impl SizeOfEngine {
    // == Size Of ==
    /// Computes the units charged for one entry.
    ///
    /// # Arguments
    /// * `key` - The entry key
    /// * `value` - The entry value
    /// * `overhead` - Bytes of store-side bookkeeping for the entry
    ///
    /// Deterministic for identical input shapes.
    pub fn size_of<K: SizeOf, V: SizeOf>(
        &self,
        key: &K,
        value: &V,
        overhead: u64,
    ) -> Result<u64, SizeOfError> {
        match *self {
            SizeOfEngine::Unit => Ok(1),
            SizeOfEngine::Constant {
                key: key_bytes,
                value: value_bytes,
                container,
            } => Ok(key_bytes + value_bytes + container),
            SizeOfEngine::Deep {
                max_depth,
                abort_on_depth_exceeded,
            } => {
                let mut walker = SizeWalker::new(max_depth, abort_on_depth_exceeded);
                let key_size = deep_size_of(key, &mut walker)?;
                let value_size = deep_size_of(value, &mut walker)?;
                if walker.truncated() {
                    tracing::warn!(
                        max_depth,
                        "sizing stopped at maximum depth; entry size is underestimated"
                    );
                }
                Ok((key_size + value_size) as u64 + overhead)
            }
        }
    }
}

impl FromStr for SizeOfEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unit" | "count" => Ok(SizeOfEngine::Unit),
            "deep" | "bytes" => Ok(SizeOfEngine::default()),
            other => Err(format!("unknown sizeof engine '{}'", other)),
        }
    }
}
