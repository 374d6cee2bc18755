//! Performance benchmarks for the relay's hot paths

use server::checksum::ChecksumTracker;
use server::frame_packer::input_channel;
use shared::{Checksum, Message, NetReader, NetWriter};
use std::time::Instant;

/// Benchmarks packing frames with a realistic number of inputs
#[test]
fn benchmark_frame_packing() {
    let (sink, mut packer) = input_channel();
    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        for player in 0..8u8 {
            sink.add_input(vec![player, (i % 256) as u8, 0, 0, 0, 0])
                .unwrap();
        }
        let frame = packer.pack();
        assert!(frame.len() > 3);
    }

    let duration = start.elapsed();
    println!(
        "Frame packing: {} frames of 8 inputs in {:?} ({:.2} μs/frame)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(packer.frames_packed(), iterations as u64);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks checksum message encode and decode
#[test]
fn benchmark_checksum_codec() {
    let mut writer = NetWriter::with_capacity(32);
    let iterations = 100_000u64;
    let start = Instant::now();

    for frame_number in 0..iterations {
        Message::Checksum(Checksum {
            frame_number,
            value: frame_number as i64 * 31,
        })
        .write_to(&mut writer)
        .unwrap();

        let mut reader = NetReader::new(writer.data());
        reader.get_u8().unwrap();
        let decoded = Checksum::deserialize(&mut reader).unwrap();
        assert_eq!(decoded.frame_number, frame_number);
    }

    let duration = start.elapsed();
    println!(
        "Checksum codec: {} round trips in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks checksum observation for a long match with retention
#[test]
fn benchmark_checksum_tracking() {
    let mut tracker = ChecksumTracker::with_retention(Some(600));
    let iterations = 100_000u64;
    let start = Instant::now();

    for frame in 0..iterations {
        for _ in 0..4 {
            tracker.observe(frame, frame as i64);
        }
    }

    let duration = start.elapsed();
    println!(
        "Checksum tracking: {} observations in {:?}",
        iterations * 4,
        duration
    );

    assert!(tracker.len() <= 601);
    assert!(duration.as_millis() < 2000);
}
