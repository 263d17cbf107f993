//! Fuzz target: the orchestrator's verdict parser.
//!
//! Worker stdout is adversarial. Parsing must never panic, and anything
//! accepted must survive a serialise/parse round trip unchanged.

#![no_main]

use gradebox_core::VerdictRecord;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(verdict) = VerdictRecord::from_payload(data) {
        let payload = verdict.to_payload().expect("an accepted verdict must re-encode");
        let again = VerdictRecord::from_payload(payload.as_bytes()).expect("a re-encoded verdict must parse");
        assert_eq!(again, verdict);
    }
});
