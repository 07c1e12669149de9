use core::{hint::black_box, time::Duration};
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use mixer_tonic_core::{
    attribute::{Tracker, decode, encode},
    mixer::{Bag, Dictionary, ProtoBag, Value},
    proto::Attributes,
};
use std::{
    collections::BTreeMap,
    sync::Arc,
    time::UNIX_EPOCH,
};

// Attributes per bag; roughly what a sidecar sends on a check.
const ATTRS: usize = 48;

fn sample_bag(dictionary: &Dictionary) -> ProtoBag {
    let mut bag = ProtoBag::new();
    let globals = (0..dictionary.len() as i32)
        .filter_map(|i| dictionary.resolve(i, &[]).ok())
        .take(ATTRS / 2);
    for (i, name) in globals.enumerate() {
        bag.insert(name, Value::from(format!("value-{i}")));
    }
    for i in 0..ATTRS / 2 {
        let name = format!("custom.attr.{i}");
        let value = match i % 6 {
            0 => Value::from(i as i64),
            1 => Value::from(i as f64 / 3.0),
            2 => Value::from(i % 2 == 0),
            3 => Value::from(UNIX_EPOCH + Duration::from_secs(1_700_000_000 + i as u64)),
            4 => Value::from(Duration::from_millis(i as u64)),
            _ => {
                let mut m = BTreeMap::new();
                m.insert(":authority".to_string(), "example.com".to_string());
                m.insert("x-request-id".to_string(), format!("{i}"));
                Value::from(m)
            }
        };
        bag.insert(name, value);
    }
    bag
}

fn sample_wire(dictionary: &Dictionary) -> Attributes {
    let bag = sample_bag(dictionary);
    let names = bag.names();
    encode(&bag, names.iter().map(String::as_str), dictionary)
}

fn benchmark_decode(c: &mut Criterion) {
    let dictionary = Dictionary::well_known();
    let wire = sample_wire(&dictionary);

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(ATTRS as u64));
    group.bench_function(format!("decode/{ATTRS}"), |b| {
        b.iter(|| black_box(decode(black_box(&wire), &dictionary)));
    });
    group.finish();
}

fn benchmark_encode(c: &mut Criterion) {
    let dictionary = Dictionary::well_known();
    let bag = sample_bag(&dictionary);
    let names = bag.names();

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(ATTRS as u64));
    group.bench_function(format!("encode/{ATTRS}"), |b| {
        b.iter(|| black_box(encode(&bag, names.iter().map(String::as_str), &dictionary)));
    });
    group.finish();
}

fn benchmark_tracker_deltas(c: &mut Criterion) {
    let dictionary = Arc::new(Dictionary::well_known());
    let full = sample_wire(&dictionary);
    let delta = Attributes {
        words: vec!["custom.attr.0".to_string()],
        int64s: [(-1, 7)].into(),
        ..Default::default()
    };

    let mut group = c.benchmark_group("tracker");
    group.throughput(Throughput::Elements(1));
    group.bench_function("apply_proto/delta", |b| {
        b.iter_batched(
            || {
                let mut tracker = Tracker::new(Arc::clone(&dictionary));
                if let Ok(bag) = tracker.apply_proto(&full) {
                    bag.done();
                }
                tracker
            },
            |mut tracker| {
                if let Ok(bag) = tracker.apply_proto(black_box(&delta)) {
                    black_box(bag.get("custom.attr.0"));
                    bag.done();
                }
                tracker.done();
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_decode,
    benchmark_encode,
    benchmark_tracker_deltas,
);
criterion_main!(benches);
