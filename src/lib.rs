//! # bytering
//!
//! A fixed-capacity circular byte buffer for exactly one producer and one
//! consumer, plus a framed-traffic stress harness built on top of it.
//!
//! The buffer owns a power-of-two byte region addressed through masked,
//! free-running indices, so insertion and removal wrap around the end of
//! storage without modulo arithmetic. `write`, `read` and `peek` never
//! block: each moves as many bytes as space allows and reports the count,
//! and callers loop on the remainder. Splitting the buffer yields two
//! single-role handles whose index updates are published with
//! acquire/release ordering, making the pair safe to move onto separate
//! threads.
//!
//! ## Example
//!
//! ```
//! use bytering::RingBuffer;
//!
//! let (mut tx, mut rx) = RingBuffer::with_capacity(8, 1)?.split();
//!
//! assert_eq!(tx.write(&[1, 2, 3, 4, 5, 6]), 6);
//! let mut out = [0u8; 4];
//! assert_eq!(rx.read(&mut out), 4);
//! assert_eq!(out, [1, 2, 3, 4]);
//!
//! // The next write wraps around the end of storage.
//! assert_eq!(tx.write(&[7, 8, 9, 10, 11, 12]), 6);
//! let mut rest = [0u8; 8];
//! assert_eq!(rx.read(&mut rest), 8);
//! assert_eq!(rest, [5, 6, 7, 8, 9, 10, 11, 12]);
//! # Ok::<(), bytering::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod ring;
pub mod seed;
pub mod source;
pub mod stress;

pub use error::Error;
pub use ring::{Consumer, Producer, RingBuffer};
