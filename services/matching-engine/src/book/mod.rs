//! Order book building blocks
//!
//! FIFO price levels and lazily-pruned price heaps, one pair per side.

pub mod price_heap;
pub mod price_level;

pub use price_heap::PriceHeap;
pub use price_level::PriceLevel;
