//! Fuzz target: the engine front end.
//!
//! Lexing, parsing and the subset policy must reject bad source with a
//! compile error, never a panic or a stack overflow.

#![no_main]

use gradebox_engine::EngineError;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    if let Err(e) = gradebox_engine::compile(source) {
        assert!(matches!(e, EngineError::Compile { .. }), "front end produced {e:?}");
    }
});
