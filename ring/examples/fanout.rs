//! Fans a stream of samples out to a fast and a slow consumer.
//!
//! Run with `RUST_LOG=fibre_ring=debug cargo run -p fibre_ring --example fanout`
//! to see reader lifecycle and skip events.

use fibre_ring::{ReadError, RingBuffer};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_thread_names(true)
    .init();

  let ring = Arc::new(RingBuffer::<u32>::new(32).expect("non-zero capacity"));

  let mut fast = ring.blocking_reader().expect("ring is open");
  let fast_handle = thread::Builder::new()
    .name("fast".into())
    .spawn(move || {
      let mut buf = [0u32; 8];
      let mut total = 0usize;
      loop {
        match fast.read(&mut buf) {
          Ok(n) => total += n,
          Err(ReadError::EndOfData) => break,
          Err(err) => {
            eprintln!("fast reader failed: {err}");
            break;
          }
        }
      }
      fast.close();
      total
    })
    .expect("spawn fast reader");

  // The slow reader falls behind and skips what it missed.
  let mut slow = ring
    .reader_builder()
    .blocking(true)
    .auto_skip(true)
    .build()
    .expect("ring is open");
  let slow_handle = thread::Builder::new()
    .name("slow".into())
    .spawn(move || {
      let mut total = 0usize;
      while let Ok(_sample) = slow.read_one() {
        total += 1;
        thread::sleep(Duration::from_micros(200));
      }
      slow.close();
      total
    })
    .expect("spawn slow reader");

  for sample in 0..2_000u32 {
    ring.push(sample).expect("ring is open");
    if sample % 64 == 0 {
      thread::sleep(Duration::from_millis(1));
    }
  }
  println!("written: {}", ring.total_written());
  ring.close();

  println!("fast reader received {}", fast_handle.join().expect("fast reader panicked"));
  println!("slow reader received {}", slow_handle.join().expect("slow reader panicked"));

  fibre_ring::telemetry::print_telemetry_report();
}
