#![no_main]

use libfuzzer_sys::fuzz_target;
use opframe_decode::{InstructionDecoder, Mode, X86Decoder, MAX_INSTRUCTION_LEN};

fuzz_target!(|data: &[u8]| {
    // First byte picks the mode, the rest is the instruction stream
    let Some((&selector, code)) = data.split_first() else {
        return;
    };
    let mode = match selector % 3 {
        0 => Mode::Mode16,
        1 => Mode::Mode32,
        _ => Mode::Mode64,
    };
    let decoder = X86Decoder::new(mode);

    // Should never panic; errors are fine
    match decoder.decode(code) {
        Ok(decoded) => {
            assert!(decoded.size() <= MAX_INSTRUCTION_LEN);
            assert_eq!(decoded.field_lengths().total(), decoded.size());
        }
        Err(invalid) => assert!(invalid.consumed <= code.len()),
    }

    // Also test decoding a block of instructions
    if code.len() >= 16 {
        let entries = decoder.decode_block(code);
        let covered: usize = entries
            .iter()
            .map(|entry| entry.result.as_ref().map(|d| d.size()).unwrap_or(1))
            .sum();
        assert_eq!(covered, code.len());
    }
});
