#![no_main]

use libfuzzer_sys::fuzz_target;
use mailgate_core::{normalize_email, AllowList};

fuzz_target!(|entries: Vec<String>| {
    let list: AllowList = entries.iter().collect();

    for entry in &entries {
        if normalize_email(entry).is_empty() {
            continue;
        }
        // Loaded entries are found again and never added twice
        assert!(list.contains(entry));
        assert!(!list.add(entry));
    }

    // Listing is free of duplicates
    let listed = list.list();
    let mut deduped = listed.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), listed.len());
});
