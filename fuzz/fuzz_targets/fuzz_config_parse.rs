#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(file) = toml::from_str::<mcp_sandbox::config::FileConfig>(s) {
            let _ = mcp_sandbox::Config::resolve(Some(file), |_| None);
        }
    }
});
