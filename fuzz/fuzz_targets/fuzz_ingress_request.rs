#![no_main]

use libfuzzer_sys::fuzz_target;
use mailgate_daemon::CommandRequest;

fuzz_target!(|data: &[u8]| {
    // Relay payloads are untrusted JSON
    if let Ok(request) = serde_json::from_slice::<CommandRequest>(data) {
        // Ids re-serialize as strings and parse back to the same value
        let json = serde_json::to_vec(&request).unwrap();
        let again: CommandRequest = serde_json::from_slice(&json).unwrap();

        assert_eq!(request.user_id, again.user_id);
        assert_eq!(request.context_id, again.context_id);
        assert_eq!(request.is_admin, again.is_admin);
        assert_eq!(request.content, again.content);
    }
});
