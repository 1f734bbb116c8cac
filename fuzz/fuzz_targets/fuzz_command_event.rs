#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = mcp_sandbox::sandbox::e2b::parse_command_event(line);
    }
});
