//! # tensorbus Shared Memory Segments
//!
//! Backing store for tensor payloads exchanged between local processes.
//! Each payload lives in its own named segment file (by default under
//! `/dev/shm`) made of a 64-byte header followed by the raw tensor bytes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │   Publisher     │    │  Segment file   │    │   Consumer      │
//! │                 │    │                 │    │                 │
//! │ ShmAllocator    ├───►│ [Header|Data]   ├───►│ SegmentView     │
//! │  └ ShmSegment   │    │ write version   │    │                 │
//! └─────────────────┘    │ writer pid      │    └─────────────────┘
//!          │             └─────────────────┘
//!          ▼
//!   {segment}.meta  ◄──── SegmentDiscovery (list / orphan cleanup)
//! ```
//!
//! A segment is addressed by the pair ([`SegmentRefs::manager_ref`],
//! [`SegmentRefs::segment_ref`]). The manager reference names the owning
//! allocator (one per process), the segment reference names the file.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tensorbus_shm::{SegmentAllocator, SegmentView, ShmAllocator};
//! use tb::config::ShmConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut allocator = ShmAllocator::new(ShmConfig::default());
//! let refs = allocator.share(&[1, 2, 3, 4])?;
//! allocator.copy_into(&refs, &[5, 6, 7, 8])?;
//!
//! let mut view = SegmentView::attach(&ShmConfig::default().dir, &refs)?;
//! assert_eq!(view.read()?, &[5, 6, 7, 8]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - **ShmSegment**: single writer, owned by one allocator
//! - **SegmentView**: one per reader thread; torn reads are retried using
//!   the odd/even header version

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod discovery;
pub mod error;
pub mod header;
pub mod platform;
pub mod segment;

pub use allocator::{SegmentAllocator, SegmentRefs, ShmAllocator};
pub use discovery::{SegmentDiscovery, SegmentInfo, SegmentStatus};
pub use error::{ShmError, ShmResult};
pub use header::{HEADER_SIZE, SegmentHeader, TENSORBUS_SHM_MAGIC};
pub use segment::{SegmentView, ShmSegment};
