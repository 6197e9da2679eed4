// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property: the per-session frame ring buffer never exceeds `max_buffer_size`
//! and always holds exactly the most recent frames in arrival order, no
//! matter how many frames are pushed through it.

use super::*;
use manager_core::{DeviceId, FakeClock, Frame, SessionId, StreamConfig, WorkerId};
use proptest::prelude::*;
use std::time::Duration;

fn frame(number: u64) -> Frame {
    Frame {
        frame_number: number,
        timestamp: number as i64,
        width: 64,
        height: 64,
        format: "jpeg".to_string(),
        data: vec![0u8; 1],
        size: 1,
    }
}

proptest! {
    #[test]
    fn ring_buffer_never_exceeds_capacity_and_keeps_latest_frames(
        max_buffer_size in 1usize..16,
        frame_numbers in prop::collection::vec(0u64..1000, 0..200),
    ) {
        let clock = FakeClock::new();
        let config = StreamProxyConfig { max_buffer_size, ..StreamProxyConfig::default() };
        let p = StreamProxy::new(clock.clone(), config);

        let device_id = DeviceId::new("d1");
        let worker_id = WorkerId::new("w1");
        p.handle_start(worker_id.clone(), device_id.clone(), SessionId::new("s1"), StreamConfig::default(), None);

        let mut expected: std::collections::VecDeque<u64> = std::collections::VecDeque::new();
        for n in &frame_numbers {
            // Advance well past the default rate-limit window so every push
            // actually lands in the buffer; this property targets buffer
            // bounds, not the independent rate-limiting behavior.
            clock.advance(Duration::from_millis(1000));
            let accepted = p.handle_frame(&worker_id, &device_id, frame(*n));
            prop_assert!(accepted);

            expected.push_back(*n);
            while expected.len() > max_buffer_size {
                expected.pop_front();
            }

            prop_assert!(p.buffer_len(&device_id) <= max_buffer_size);
            prop_assert_eq!(
                p.buffered_frame_numbers(&device_id),
                expected.iter().copied().collect::<Vec<_>>()
            );
        }
    }
}
