//! `ext-line-sort` sorts text files that don't fit into memory.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it splits the input into blocks that each fit in the memory budget, sorts every block and saves it
//! to a temporary file, during the second pass it merges the sorted blocks together.
//! For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `ext-line-sort` supports the following features:
//!
//! * **Bounded memory:**
//!   block size and merge buffers are derived from a single memory budget (`100M`, `512K`, `2G`, ...).
//! * **Custom ordering:**
//!   lines are compared byte-wise by default, a key function or a compare function can be provided instead.
//! * **Stable:**
//!   lines comparing equal keep their input order.
//! * **Multithreading support:**
//!   blocks are sorted in multiple threads utilizing maximum CPU resources.
//! * **Compressed temporary storage:**
//!   temporary blocks can be gzip compressed to save disk space.
//!
//! # Example
//!
//! ```no_run
//! use std::path;
//!
//! use ext_line_sort::{ExternalSorter, ExternalSorterBuilder, MemoryBudget};
//!
//! fn main() {
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_memory_budget("50M".parse::<MemoryBudget>().unwrap())
//!         .build()
//!         .unwrap();
//!
//!     sorter
//!         .sort_file(path::Path::new("input.txt"), path::Path::new("output.txt"))
//!         .unwrap();
//! }
//! ```

pub mod budget;
pub mod buffer;
pub mod merger;
pub mod record;
pub mod select;
pub mod sort;
pub mod splitter;
pub mod store;
pub mod streams;

pub use budget::MemoryBudget;
pub use buffer::BlockBuffer;
pub use merger::{KWayMerger, MergeSummary};
pub use record::Record;
pub use select::{MinSelection, SelectionStrategy};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortSummary};
pub use splitter::BlockSplitter;
pub use store::{BlockId, BlockStore, GzipStore, PlainStore};
pub use streams::StreamBuffers;
