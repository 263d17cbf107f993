//! Fuzz target: the worker's request parser.
//!
//! Arbitrary stdin must yield either a request or the invalid-payload
//! verdict, never a panic.

#![no_main]

use gradebox_core::verdict::INVALID_REQUEST_MESSAGE;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match gradebox_worker::pipeline::parse_request(data) {
        Ok(request) => {
            // Whatever parsed must encode back to a payload that parses the same.
            let payload = request.to_payload().expect("a parsed request must re-encode");
            let again = gradebox_core::SubmissionRequest::from_payload(payload.as_bytes())
                .expect("a re-encoded request must parse");
            assert_eq!(again, request);
        }
        Err(verdict) => assert_eq!(verdict.message(), INVALID_REQUEST_MESSAGE),
    }
});
