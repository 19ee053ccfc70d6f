#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mailgate_daemon::Command;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    prefix: &'a str,
    content: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    // Parsing arbitrary chat text should never panic
    let Some(command) = Command::parse(input.prefix, input.content) else {
        return;
    };

    // Anything recognized must have started with the prefix
    assert!(input.content.trim_start().starts_with(input.prefix));

    // Arguments are single whitespace-free tokens
    match command {
        Command::Verify(Some(arg)) | Command::Code(Some(arg)) | Command::AddEmail(Some(arg)) => {
            assert!(!arg.is_empty());
            assert!(!arg.chars().any(char::is_whitespace));
        }
        _ => {}
    }
});
