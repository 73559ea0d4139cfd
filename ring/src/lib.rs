#![warn(missing_debug_implementations, rust_2018_idioms)]

//! A fixed-capacity ring buffer with one writer and many independent readers.
//!
//! `fibre_ring` fans a continuous stream out to consumers running at
//! different paces without copying the stream per consumer. The writer never
//! waits: once the ring is full it overwrites the oldest elements. Each
//! [`Reader`] keeps its own cursor and is told with [`ReadError::Stale`] when
//! it fell so far behind that its data was overwritten, instead of reading
//! garbage.
//!
//! ## Behavior
//!
//! - **Overwrite, no backpressure**: slow readers never slow the writer.
//! - **Independent cursors**: readers never observe or move each other.
//! - **Stale detection**: a reader more than one lap behind fails, or with
//!   auto-skip jumps forward to the oldest valid element.
//! - **Blocking reads**: blocking readers wait for new data instead of
//!   returning [`ReadError::EndOfData`], and are released when the ring
//!   closes.
//! - **Close barrier**: [`RingBuffer::close`] waits until every reader has
//!   been closed (or dropped), so a producer can know its consumers drained.
//!
//! # Examples
//!
//! ```
//! use fibre_ring::{ReadError, RingBuffer};
//!
//! let ring = RingBuffer::new(10).unwrap();
//! let mut reader = ring.reader().unwrap();
//!
//! ring.write(b"hello").unwrap();
//!
//! let mut buf = [0u8; 5];
//! assert_eq!(reader.read(&mut buf), Ok(5));
//! assert_eq!(&buf, b"hello");
//! assert_eq!(reader.read(&mut buf), Err(ReadError::EndOfData));
//!
//! // Overflow the ring: the reader's unread data gets overwritten.
//! ring.write(b"helloworld!").unwrap();
//! assert_eq!(reader.read(&mut buf), Err(ReadError::Stale));
//!
//! reader.close();
//! ring.close();
//! ```
//!
//! ### Blocking readers
//!
//! ```
//! use fibre_ring::{ReadError, RingBuffer};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let ring = Arc::new(RingBuffer::new(64).unwrap());
//! let mut reader = ring.blocking_reader().unwrap();
//!
//! let consumer = thread::spawn(move || {
//!   let mut received = Vec::new();
//!   loop {
//!     match reader.read_one() {
//!       Ok(value) => received.push(value),
//!       Err(ReadError::EndOfData) => break, // ring closed and drained
//!       Err(err) => panic!("unexpected error: {err}"),
//!     }
//!   }
//!   reader.close();
//!   received
//! });
//!
//! ring.append(1..=3).unwrap();
//! ring.close(); // returns once the consumer closed its reader
//! assert_eq!(consumer.join().unwrap(), vec![1, 2, 3]);
//! ```

pub mod builder;
pub mod error;
pub mod telemetry;

mod buffer;
mod position;
mod reader;
mod sync_util;

pub use buffer::RingBuffer;
pub use builder::{ReaderBuilder, StartPosition};
pub use error::{BuildError, ReadError, WriteError};
pub use reader::Reader;
