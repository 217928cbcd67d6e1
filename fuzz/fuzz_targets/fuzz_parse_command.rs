#![no_main]
use libfuzzer_sys::fuzz_target;
use powerlimiter::limiter::LimiterCommand;

fuzz_target!(|data: &[u8]| {
    // First line is the topic, the rest the payload
    let text = String::from_utf8_lossy(data);
    let (topic, payload) = text.split_once('\n').unwrap_or((text.as_ref(), ""));

    let _ = LimiterCommand::parse(topic, payload);
    for known in ["mode", "threshold/voltage/start", "upper_power_limit"] {
        let _ = LimiterCommand::parse(known, &text);
    }
});
