#![no_main]

use std::sync::Arc;

use formula_pdf::{OpenOptions, Xref};
use libfuzzer_sys::fuzz_target;

/// Keep the harness itself bounded; the caps below are far tighter than the library defaults.
const MAX_INPUT_BYTES: usize = 1 << 20;

fn options() -> OpenOptions {
    OpenOptions {
        max_document_bytes: MAX_INPUT_BYTES as u64,
        max_xref_entries: 1 << 16,
        max_object_stream_members: 1 << 12,
        object_stream_cache_capacity: 2,
        max_fetch_depth: 16,
        max_decoded_stream_bytes: 1 << 20,
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() > MAX_INPUT_BYTES {
        return;
    }

    let Ok(mut xref) = Xref::from_bytes(Arc::from(data), options()) else {
        return;
    };

    let _ = xref.fetch_ref(xref.root());
    for num in 0..xref.len() {
        let Ok(num) = u32::try_from(num) else {
            break;
        };
        let first = xref.fetch(num, 0);
        // Cached object streams must not change what a lookup returns.
        assert_eq!(first, xref.fetch(num, 0));
    }
});
