//! Throughput benchmarks

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tokio_util::codec::Decoder;
use weighlink_core::core::protocol::FrameShape;
use weighlink_core::{
    decode, detect, ConnectionSettings, FrameAssembler, ProtocolId, ProtocolSelector, Session,
    WeightReading,
};

struct Discard;

impl weighlink_core::SessionObserver for Discard {
    fn on_reading(&mut self, reading: &WeightReading) {
        black_box(reading);
    }
}

fn decode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let line = b"ST,GS,  +1.234 kg\r\n";
    group.throughput(Throughput::Bytes(line.len() as u64));
    group.bench_function("tokves_line", |b| {
        b.iter(|| decode(ProtocolId::TokvesSh50.into(), black_box(line)))
    });

    group.bench_function("auto_line", |b| {
        b.iter(|| decode(ProtocolSelector::Auto, black_box(line)))
    });

    let frame = [0xe3, 0x01, 0x00, 0x00, 0x02, 0x00, 0x00, 0x03, 0x00, 0x40, 0x7f, 0x7f, 0x3f];
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("newton_binary_4ch", |b| {
        b.iter(|| decode(ProtocolId::Newton42Binary.into(), black_box(&frame)))
    });

    group.finish();
}

fn detect_benchmark(c: &mut Criterion) {
    let samples = [
        "W +123.450 kg",
        "+0012345",
        "ST,GS,  +1.234 kg",
        "ST,+00123.45,kg",
        "N+00012.345 kg",
        "noise",
    ];

    let mut group = c.benchmark_group("detect");
    group.bench_function("samples", |b| {
        b.iter(|| {
            for sample in &samples {
                black_box(detect(black_box(sample)));
            }
        })
    });
    group.finish();
}

fn stream_benchmark(c: &mut Criterion) {
    let stream: Vec<u8> = (0..1000)
        .flat_map(|i| format!("W +{}.{:03} kg\r\n", i / 10, i % 1000).into_bytes())
        .collect();

    let mut group = c.benchmark_group("stream");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("frame_lines", |b| {
        b.iter(|| {
            let mut assembler = FrameAssembler::new(FrameShape::Line);
            let mut src = BytesMut::from(&stream[..]);
            let mut frames = 0usize;
            while let Ok(Some(frame)) = assembler.decode(&mut src) {
                black_box(frame);
                frames += 1;
            }
            frames
        })
    });

    group.bench_function("session_feed_64b_chunks", |b| {
        b.iter(|| {
            let mut session = Session::new(ProtocolSelector::Auto, Discard);
            session.begin_connect(&ConnectionSettings::default()).unwrap();
            session.connection_opened().unwrap();
            for chunk in stream.chunks(64) {
                session.feed(black_box(chunk)).unwrap();
            }
            session.stats().readings
        })
    });

    group.finish();
}

criterion_group!(benches, decode_benchmark, detect_benchmark, stream_benchmark);
criterion_main!(benches);
