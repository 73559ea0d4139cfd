// tests/ring_blocking.rs

mod common;
use common::*;

use fibre_ring::{ReadError, RingBuffer};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

#[test]
fn blocking_read_waits_for_write() {
  let ring = Arc::new(RingBuffer::new(64).unwrap());
  let mut r = ring.blocking_reader().unwrap();

  let barrier = Arc::new(Barrier::new(2));
  let reader_barrier = barrier.clone();
  let handle = thread::spawn(move || {
    let mut rbuf = [0u8; 3];
    reader_barrier.wait();
    let res = r.read(&mut rbuf);
    r.close();
    (res, rbuf)
  });

  barrier.wait();
  thread::sleep(SHORT_TIMEOUT);
  assert!(!handle.is_finished(), "Reader should be blocked");

  ring.write(b"foo").unwrap();
  let (res, rbuf) = handle.join().unwrap();
  assert_eq!(res, Ok(3));
  assert_eq!(&rbuf, b"foo");

  // Hangs here if the reader's close was lost.
  ring.close();
}

#[test]
fn blocking_read_returns_pending_data_immediately() {
  let ring = RingBuffer::new(8).unwrap();
  let mut r = ring.blocking_reader().unwrap();
  ring.append([1, 2, 3]).unwrap();

  let mut out = [0; 8];
  assert_eq!(r.read(&mut out), Ok(3));
  assert_eq!(&out[..3], &[1, 2, 3]);
}

#[test]
fn close_releases_blocked_reader() {
  let ring = Arc::new(RingBuffer::<u32>::new(8).unwrap());
  let mut r = ring.blocking_reader().unwrap();

  let handle = thread::spawn(move || {
    let res = r.read_one();
    r.close();
    res
  });

  thread::sleep(SHORT_TIMEOUT);
  assert!(!handle.is_finished(), "Reader should be blocked");

  ring.close();
  assert_eq!(handle.join().unwrap(), Err(ReadError::EndOfData));
  assert_eq!(ring.live_readers(), 0);
}

#[test]
fn close_waits_for_every_reader() {
  let ring = Arc::new(RingBuffer::<u32>::new(8).unwrap());
  let r1 = ring.reader().unwrap();
  let r2 = ring.blocking_reader().unwrap();

  let closer = {
    let ring = Arc::clone(&ring);
    thread::spawn(move || ring.close())
  };

  thread::sleep(SHORT_TIMEOUT);
  assert!(!closer.is_finished(), "close should wait for readers");
  assert!(ring.is_closed());

  r1.close();
  thread::sleep(SHORT_TIMEOUT);
  assert!(!closer.is_finished(), "close should wait for the second reader");

  // Dropping counts as closing.
  drop(r2);
  closer.join().unwrap();
}

#[test]
fn blocked_readers_drain_then_see_end_of_data() {
  let ring = Arc::new(RingBuffer::new(ITEMS_MEDIUM).unwrap());
  let barrier = Arc::new(Barrier::new(4));
  let mut handles = vec![];

  for _ in 0..3 {
    let mut r = ring.blocking_reader().unwrap();
    let barrier = barrier.clone();
    handles.push(thread::spawn(move || {
      barrier.wait();
      let mut seen = Vec::new();
      loop {
        match r.read_one() {
          Ok(v) => seen.push(v),
          Err(ReadError::EndOfData) => break,
          Err(err) => panic!("unexpected read error: {err}"),
        }
      }
      r.close();
      seen
    }));
  }

  barrier.wait();
  for i in 0..ITEMS_LOW {
    ring.push(i).unwrap();
  }
  ring.close();

  for h in handles {
    assert_eq!(h.join().unwrap(), (0..ITEMS_LOW).collect::<Vec<_>>());
  }
}

#[test]
fn blocking_current_reader_sees_only_new_data() {
  let ring = Arc::new(RingBuffer::new(16).unwrap());
  ring.append(0..5).unwrap();
  let mut r = ring.blocking_current_reader().unwrap();

  let handle = thread::spawn(move || {
    let mut out = [0; 4];
    let res = r.read(&mut out);
    (res, out)
  });

  thread::sleep(SHORT_TIMEOUT);
  ring.append(100..104).unwrap();
  let (res, out) = handle.join().unwrap();
  assert_eq!(res, Ok(4));
  assert_eq!(out, [100, 101, 102, 103]);
}

#[test]
fn read_timeout_elapses_without_data() {
  let ring = RingBuffer::<u8>::new(8).unwrap();
  let mut r = ring.blocking_reader().unwrap();
  let mut out = [0u8; 4];

  let start = Instant::now();
  assert_eq!(r.read_timeout(&mut out, SHORT_TIMEOUT), Err(ReadError::Timeout));
  assert!(start.elapsed() >= SHORT_TIMEOUT);
  assert_eq!(r.read_one_timeout(SHORT_TIMEOUT), Err(ReadError::Timeout));

  // Timing out leaves the reader usable.
  ring.write(b"ok").unwrap();
  assert_eq!(r.read_timeout(&mut out, LONG_TIMEOUT), Ok(2));
  assert_eq!(&out[..2], b"ok");
}

#[test]
fn read_timeout_returns_data_written_while_waiting() {
  let ring = Arc::new(RingBuffer::new(8).unwrap());
  let mut r = ring.blocking_reader().unwrap();

  let handle = thread::spawn(move || r.read_one_timeout(LONG_TIMEOUT));
  thread::sleep(SHORT_TIMEOUT);
  ring.push(7u32).unwrap();
  assert_eq!(handle.join().unwrap(), Ok(7));
}

#[test]
fn read_timeout_on_non_blocking_reader_does_not_wait() {
  let ring = RingBuffer::<u8>::new(8).unwrap();
  let mut r = ring.reader().unwrap();
  assert_eq!(r.read_one_timeout(LONG_TIMEOUT), Err(ReadError::EndOfData));
}

#[test]
fn dropping_ring_releases_blocked_reader() {
  let ring = RingBuffer::<u32>::new(8).unwrap();
  let mut r = ring.blocking_reader().unwrap();

  let handle = thread::spawn(move || r.read_one());
  thread::sleep(SHORT_TIMEOUT);
  drop(ring);
  assert_eq!(handle.join().unwrap(), Err(ReadError::EndOfData));
}
