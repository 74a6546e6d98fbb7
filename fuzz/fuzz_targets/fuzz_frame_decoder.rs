#![no_main]
use aqua_core::{DecodeEvent, DeviceConfig, FrameDecoder};
use libfuzzer_sys::fuzz_target;

// Each input is split into notifications on 0xFF; a small ceiling exercises overflow.
fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new(256);
    for chunk in data.split(|b| *b == 0xFF) {
        if let DecodeEvent::Document(doc) = decoder.push(chunk) {
            if let Ok(cfg) = DeviceConfig::from_document(&doc) {
                let _ = cfg.validate();
                let _ = DeviceConfig::from_document(&cfg.to_document());
            }
        }
        assert!(decoder.buffered() <= 256);
    }
});
