//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Encode and parse throughput for a mid-sized message.

#[macro_use] extern crate criterion;
extern crate dynwire;

use criterion::{black_box, Criterion, Throughput};

use dynwire::{DynamicMessage, FieldDef, FieldType, MessageDef,
              MessageDescriptor, PoolBuilder};

fn record_type() -> MessageDescriptor {
    PoolBuilder::new()
        .package("bench")
        .message(MessageDef::new("Record")
                 .field(FieldDef::optional("id", 1, FieldType::UInt64))
                 .field(FieldDef::optional("name", 2, FieldType::String))
                 .field(FieldDef::repeated("samples", 3, FieldType::SInt32))
                 .field(FieldDef::repeated("children", 4, FieldType::Message)
                        .type_name("Record"))
                 .field(FieldDef::map("attrs", 5, FieldType::String,
                                      FieldType::Int64)))
        .build()
        .unwrap()
        .get_message_by_name("bench.Record")
        .unwrap()
}

fn sample(desc: &MessageDescriptor) -> DynamicMessage {
    let mut msg = DynamicMessage::new(desc.clone());
    msg.set("id", 123456789u64).unwrap();
    msg.set("name", "a moderately long record name").unwrap();
    {
        let samples = msg.list_mut("samples").unwrap();
        for i in -500..500 {
            samples.push(i * 37).unwrap();
        }
    }
    for i in 0..20u64 {
        let child = msg.messages_mut("children").unwrap().add();
        child.set("id", i).unwrap();
        child.set("name", format!("child {}", i)).unwrap();
    }
    {
        let attrs = msg.scalar_map_mut("attrs").unwrap();
        for i in 0..50i64 {
            attrs.insert(format!("key{}", i), i * i).unwrap();
        }
    }
    msg
}

fn bench_codec(c: &mut Criterion) {
    let desc = record_type();
    let msg = sample(&desc);
    let data = msg.serialize().unwrap();

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("serialize", |b| {
        b.iter(|| black_box(&msg).serialize_partial());
    });

    group.bench_function("byte_size_uncached", |b| {
        b.iter(|| {
            let mut fresh = msg.clone();
            fresh.set("id", 1u64).unwrap();
            black_box(fresh.byte_size())
        });
    });

    group.bench_function("parse", |b| {
        b.iter(|| {
            DynamicMessage::parse(desc.clone(), black_box(&data)).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
