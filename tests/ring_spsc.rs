use cypher_engine::audio_buffer::AudioBuffer;
use cypher_engine::ring::{Handoff, Pool};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

#[test]
fn full_capacity_is_usable_and_order_is_fifo() {
    let ring = Handoff::new(4).unwrap();
    assert_eq!(ring.capacity(), 4);

    for id in 0..4 {
        ring.push(AudioBuffer::new(id, 8, 1)).unwrap();
    }
    let rejected = ring.push(AudioBuffer::new(4, 8, 1)).unwrap_err();
    assert_eq!(rejected.id(), 4);

    assert_eq!(ring.pop().unwrap().id(), 0);
    ring.push(rejected).unwrap();

    let order: Vec<usize> = std::iter::from_fn(|| ring.pop()).map(|b| b.id()).collect();
    assert_eq!(order, vec![1, 2, 3, 4]);
    assert!(ring.pop().is_none());
}

#[test]
fn capacity_rounds_up_and_zero_is_rejected() {
    assert_eq!(Handoff::<u32>::new(5).unwrap().capacity(), 8);
    assert!(Handoff::<u32>::new(0).is_err());
}

#[test]
fn threaded_producer_and_consumer_preserve_order() {
    const COUNT: usize = 100_000;
    let ring = Arc::new(Handoff::new(64).unwrap());

    let producer = {
        let ring = ring.clone();
        thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for value in 0..COUNT {
                let mut pending = value;
                loop {
                    match ring.push(pending) {
                        Ok(()) => break,
                        Err(back) => {
                            pending = back;
                            thread::yield_now();
                        }
                    }
                }
                if rng.gen_ratio(1, 1000) {
                    thread::yield_now();
                }
            }
        })
    };

    let mut expected = 0;
    while expected < COUNT {
        match ring.pop() {
            Some(value) => {
                assert_eq!(value, expected);
                expected += 1;
            }
            None => thread::yield_now(),
        }
    }
    producer.join().unwrap();
    assert!(ring.is_empty());
}

#[test]
fn pool_round_trip_returns_every_handle() {
    let pool = Arc::new(Pool::from_fn(16, |id| AudioBuffer::new(id, 4, 2)).unwrap());
    let queue = Arc::new(Handoff::new(16).unwrap());

    let producer = {
        let pool = pool.clone();
        let queue = queue.clone();
        thread::spawn(move || {
            let mut handed_out = Vec::new();
            for _ in 0..5_000 {
                let buffer = loop {
                    if let Some(buffer) = pool.try_pop() {
                        break buffer;
                    }
                    thread::yield_now();
                };
                handed_out.push(buffer.id());
                let mut pending = buffer;
                while let Err(back) = queue.push(pending) {
                    pending = back;
                    thread::yield_now();
                }
            }
            handed_out
        })
    };

    let mut returned = Vec::new();
    while returned.len() < 5_000 {
        match queue.pop() {
            Some(buffer) => {
                returned.push(buffer.id());
                pool.push(buffer).unwrap();
            }
            None => thread::yield_now(),
        }
    }

    let mut handed_out = producer.join().unwrap();
    handed_out.sort_unstable();
    returned.sort_unstable();
    assert_eq!(handed_out, returned);
    assert_eq!(pool.current_size(), 16);

    let ids: HashSet<usize> = std::iter::from_fn(|| pool.try_pop()).map(|b| b.id()).collect();
    assert_eq!(ids, (0..16).collect());
}
