//! End-to-end channel scenarios: async tasks, blocking threads, and both at
//! once on the same channel instances.

use confluence::{Channel, Interrupter, RingChannel, UnboundedChannel};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn ping_pong() {
    let ch = Channel::<String>::new();

    let ping = {
        let ch = ch.clone();
        tokio::spawn(async move {
            ch.write("ping".to_owned()).await;
            assert_eq!(ch.read().await, "pong");
        })
    };
    let pong = {
        let ch = ch.clone();
        tokio::spawn(async move {
            assert_eq!(ch.read().await, "ping");
            ch.write("pong".to_owned()).await;
        })
    };

    pong.await.unwrap();
    ping.await.unwrap();
}

#[test]
fn buffer_fill_and_drain_through_views() {
    let ch = Channel::<i32, 3>::new();
    let tx = ch.writer();
    let rx = ch.reader();

    for i in 0..3 {
        assert!(tx.try_write(i));
    }
    assert!(!tx.try_write(0));

    for i in 0..3 {
        assert_eq!(rx.try_read(), Some(i));
    }
    assert_eq!(rx.try_read(), None);
}

#[test]
fn unbounded_writes_are_synchronous_and_ordered() {
    let ch = UnboundedChannel::<i32>::new();
    let tx = ch.writer();
    let rx = ch.reader();

    for i in 0..10 {
        tx.write(i);
    }
    for i in 0..10 {
        assert_eq!(rx.try_read(), Some(i));
    }
    assert_eq!(rx.try_read(), None);
}

#[test]
fn forget_oldest_retains_the_newest_writes() {
    let ch = RingChannel::<i32, 2>::new();
    for i in [1, 2, 3, 4] {
        ch.write(i);
    }
    assert_eq!(ch.try_read(), Some(3));
    assert_eq!(ch.try_read(), Some(4));
    assert_eq!(ch.try_read(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_writers_and_readers_conserve_messages() {
    let ch = Channel::<i32, 1>::new();
    let sum = Arc::new(AtomicI32::new(0));
    let mut tasks = Vec::new();

    for i in 0..100 {
        let writer_ch = ch.clone();
        tasks.push(tokio::spawn(async move {
            writer_ch.write(i).await;
        }));
        let reader_ch = ch.clone();
        let sum = Arc::clone(&sum);
        tasks.push(tokio::spawn(async move {
            sum.fetch_add(reader_ch.read().await, Ordering::Relaxed);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(sum.load(Ordering::Relaxed), (0..100).sum::<i32>());
    assert_eq!(ch.try_read(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn values_survive_many_writers_and_many_readers() {
    const PER_TASK: i32 = 5;
    const TASKS: i32 = 3;

    let ch = Channel::<i32>::new();
    let tx = ch.writer();
    let rx = ch.reader();

    let mut producers = Vec::new();
    for task in 0..TASKS {
        let tx = tx.clone();
        producers.push(tokio::spawn(async move {
            let start = task * PER_TASK;
            for value in start..start + PER_TASK {
                tx.write(value).await;
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..TASKS {
        let rx = rx.clone();
        consumers.push(tokio::spawn(async move {
            let mut got = Vec::new();
            for _ in 0..PER_TASK {
                got.push(rx.read().await);
            }
            got
        }));
    }

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.await.unwrap());
    }
    for producer in producers {
        producer.await.unwrap();
    }

    all.sort();
    assert_eq!(all, (0..TASKS * PER_TASK).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sync_write_meets_async_read() {
    let ch = Channel::<i32>::new();

    let writer = {
        let ch = ch.clone();
        thread::spawn(move || ch.write_blocking(1))
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ch.read().await, 1);
    writer.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn async_write_meets_sync_read_in_order() {
    let ch = Channel::<i32>::new();

    let reader = {
        let ch = ch.clone();
        thread::spawn(move || {
            for i in 0..5 {
                assert_eq!(ch.read_blocking(), i);
            }
        })
    };

    for i in 0..5 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        ch.write(i).await;
    }
    reader.join().unwrap();
}

#[test]
fn sync_write_meets_sync_read() {
    let ch = Channel::<i32>::new();

    let writer = {
        let ch = ch.clone();
        thread::spawn(move || {
            for i in 0..5 {
                ch.write_blocking(i);
            }
        })
    };
    let reader = {
        let ch = ch.clone();
        thread::spawn(move || {
            for i in 0..5 {
                assert_eq!(ch.read_blocking(), i);
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

// with more writers than readers on a rendezvous channel, exactly one
// rendezvous happens per reader and every delivered value is delivered once
#[test]
fn rendezvous_pairs_exactly_min_of_writers_and_readers() {
    const WRITERS: usize = 5;
    const READERS: usize = 3;

    let ch = Channel::<usize>::new();
    let interrupters: Vec<Interrupter> = (0..WRITERS).map(|_| Interrupter::new()).collect();

    let mut writers = Vec::new();
    for (value, interrupter) in interrupters.iter().enumerate() {
        let ch = ch.clone();
        let interrupter = interrupter.clone();
        writers.push(thread::spawn(move || {
            ch.write_blocking_interruptible(&interrupter, value)
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..READERS {
        let ch = ch.clone();
        readers.push(thread::spawn(move || ch.read_blocking()));
    }
    let mut got: Vec<usize> = readers.into_iter().map(|r| r.join().unwrap()).collect();

    // release the writers left over after min(WRITERS, READERS) rendezvous
    for interrupter in &interrupters {
        interrupter.interrupt();
    }
    let delivered = writers
        .into_iter()
        .map(|w| w.join().unwrap())
        .filter(|&sent| sent)
        .count();
    assert_eq!(delivered, READERS);

    got.sort();
    got.dedup();
    assert_eq!(got.len(), READERS, "a value was delivered twice");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn channels_can_carry_channels() {
    let outer = Channel::<Channel<i32, 1>>::new();
    let inner = Channel::<i32, 1>::new();
    assert!(inner.try_write(5));

    let receiver = {
        let outer = outer.clone();
        tokio::spawn(async move { outer.read().await })
    };
    outer.write(inner.clone()).await;

    let got = receiver.await.unwrap();
    assert_eq!(got, inner);
    assert_eq!(got.try_read(), Some(5));
}
