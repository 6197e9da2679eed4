// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property: every `ManagerCommand` survives an encode -> decode round trip.

use super::*;
use proptest::prelude::*;

fn arb_manager_command() -> impl Strategy<Value = ManagerCommand> {
    prop_oneof![
        (any::<bool>(), proptest::option::of("[a-z]{0,8}"))
            .prop_map(|(success, error)| ManagerCommand::RegisterAck {
                success,
                manager_id: Some("mgr-1".to_string()),
                server_time: Some(1_700_000_000_000),
                error,
            }),
        ("[a-z0-9-]{1,12}", "[a-z0-9-]{1,12}", "[a-z0-9-]{1,12}", 1u64..600_000u64).prop_map(
            |(job_id, workflow_id, device_id, timeout_ms)| ManagerCommand::ExecuteJob {
                job_id,
                workflow_id,
                device_id,
                params: serde_json::json!({"k": "v"}),
                priority: Some(1),
                timeout_ms,
                retry: RetrySpec { max_attempts: 3, delay_ms: 5000 },
            }
        ),
        ("[a-z0-9-]{1,12}", proptest::option::of("[a-z ]{0,12}"), any::<bool>()).prop_map(
            |(job_id, reason, force)| ManagerCommand::CancelJob { job_id, reason, force }
        ),
        any::<u64>().prop_map(|timestamp| ManagerCommand::Ping { timestamp }),
    ]
}

proptest! {
    #[test]
    fn manager_command_round_trips_through_wire_encoding(cmd in arb_manager_command()) {
        let encoded = encode(&cmd).expect("encode");
        let decoded: ManagerCommand = decode(&encoded).expect("decode");
        let re_encoded = encode(&decoded).expect("re-encode");
        prop_assert_eq!(encoded, re_encoded);
    }
}
