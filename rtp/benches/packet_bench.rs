use bytes::{Bytes, BytesMut};
use criterion::{criterion_group, criterion_main, Criterion};
use rtp::extension::audio_level_extension::AudioLevelExtension;
use rtp::extension::color_space_extension::ColorSpaceExtension;
use rtp::extension::extension_map::ExtensionMap;
use rtp::extension::{ExtensionKind, HeaderExtension};
use rtp::{header::*, packet::*};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

fn benchmark_packet(c: &mut Criterion) {
    let pkt = Packet {
        header: Header {
            version: 2,
            extension: true,
            csrc: vec![1, 2],
            extension_profile: EXTENSION_PROFILE_TWO_BYTE,
            extensions: vec![
                Extension {
                    id: 1,
                    payload: Bytes::from_static(&[3, 4]),
                },
                Extension {
                    id: 2,
                    payload: Bytes::from_static(&[5, 6]),
                },
            ],
            ..Default::default()
        },
        payload: Bytes::from_static(&[0xFFu8; 15]),
        padding_size: 0,
    };
    let raw = pkt.marshal().unwrap();
    let p = Packet::unmarshal(&mut raw.clone()).unwrap();
    if pkt != p {
        panic!("marshal or unmarshal not correct: \npkt: {pkt:?} \nvs \np: {p:?}");
    }

    let mut buf = BytesMut::with_capacity(pkt.marshal_size());
    buf.resize(pkt.marshal_size(), 0);
    c.bench_function("Benchmark MarshalTo", |b| {
        b.iter(|| {
            let _ = pkt.marshal_to(&mut buf).unwrap();
        })
    });

    c.bench_function("Benchmark Marshal", |b| {
        b.iter(|| {
            let _ = pkt.marshal().unwrap();
        })
    });

    c.bench_function("Benchmark Unmarshal ", |b| {
        b.iter(|| {
            let buf = &mut raw.clone();
            let _ = Packet::unmarshal(buf).unwrap();
        })
    });
}

fn benchmark_extension(c: &mut Criterion) {
    let mut map = ExtensionMap::new();
    map.register(ExtensionKind::AudioLevel, 1).unwrap();

    let mut header = Header {
        version: 2,
        ..Default::default()
    };
    header
        .set_extension_value(
            &map,
            &AudioLevelExtension {
                level: 42,
                voice: true,
            },
        )
        .unwrap();

    c.bench_function("Benchmark AudioLevel lookup", |b| {
        b.iter(|| {
            let _ = header.get_extension_value::<AudioLevelExtension>(&map).unwrap();
        })
    });

    let color_space = ColorSpaceExtension::default().to_bytes().unwrap();
    c.bench_function("Benchmark ColorSpace parse", |b| {
        b.iter(|| {
            let _ = ColorSpaceExtension::parse(&color_space).unwrap();
        })
    });
}

criterion_group!(benches, benchmark_packet, benchmark_extension);
criterion_main!(benches);
