use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use media_relay::pipeline::{BoundedUnitQueue, EncodedUnit, ShutdownCoordinator};
use std::thread;

const UNITS: u64 = 10_000;

fn unit(sequence: u64, payload: &Bytes) -> EncodedUnit {
    EncodedUnit::new(payload.clone(), sequence, sequence * 10_000, 10_000)
}

/// One producer thread, consumer on the bench thread
fn relay(capacity: usize, payload: &Bytes) {
    let shutdown = ShutdownCoordinator::new();
    let queue = BoundedUnitQueue::new(capacity, &shutdown).unwrap();

    let producer = {
        let queue = queue.clone();
        let payload = payload.clone();
        thread::spawn(move || {
            for i in 0..UNITS {
                queue.push(unit(i, &payload)).unwrap();
            }
            shutdown.request_shutdown();
        })
    };

    let mut received = 0u64;
    while let Some(unit) = queue.pop() {
        received += unit.size() as u64;
    }
    producer.join().unwrap();
    assert_eq!(received, UNITS * payload.len() as u64);
}

fn bench_capacity(c: &mut Criterion) {
    let payload = Bytes::from(vec![0u8; 3840]);
    let mut group = c.benchmark_group("queue_relay");
    group.throughput(Throughput::Elements(UNITS));

    for capacity in [1usize, 8, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &cap| {
            b.iter(|| relay(cap, &payload))
        });
    }
    group.finish();
}

fn bench_uncontended(c: &mut Criterion) {
    let shutdown = ShutdownCoordinator::new();
    let queue = BoundedUnitQueue::new(8, &shutdown).unwrap();
    let payload = Bytes::from_static(&[0u8; 64]);

    c.bench_function("push_pop_single_thread", |b| {
        let mut i = 0u64;
        b.iter(|| {
            queue.push(unit(i, &payload)).unwrap();
            i += 1;
            queue.pop().unwrap()
        })
    });
}

criterion_group!(benches, bench_capacity, bench_uncontended);
criterion_main!(benches);
