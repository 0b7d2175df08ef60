#![no_main]
use dealpack_coach::DecodeSession;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks a split point so chunk boundaries get exercised too.
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let at = usize::from(split) % (rest.len() + 1);

    let mut session = DecodeSession::new();
    let mut events = session.push_chunk(&rest[..at]);
    events.extend(session.push_chunk(&rest[at..]));
    events.extend(session.finish());

    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1);
    assert!(events.last().is_some_and(|e| e.is_terminal()));
});
