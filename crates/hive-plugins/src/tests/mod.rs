//! Crate-level integration and BDD tests.

use crate::handler::Context;
use crate::protocol::CallRequest;
use crate::server::dispatch;


/// Handler shaped like the lobby plugin, with one operation that panics.
fn lobby_handler(ctx: &mut Context) {
    if ctx.name() == "explode" {
        panic!("lobby exploded");
    }
    let reply = format!("response[{}]", String::from_utf8_lossy(ctx.data()));
    ctx.reply(200, reply);
}

#[test]
fn panic_in_one_call_does_not_poison_the_next() {
    let first = dispatch(&lobby_handler, CallRequest::new("lobby", "explode", vec![]));
    let second = dispatch(&lobby_handler, CallRequest::new("lobby", "hello", b"x".to_vec()));
    assert_eq!(first.error(), Some("lobby exploded"));
    assert_eq!(second.payload(), b"response[x]");
}

#[test]
fn panics_on_many_threads_are_all_contained() {
    let handles: Vec<_> = (0..8)
        .map(|index| {
            std::thread::spawn(move || {
                let name = if index % 2 == 0 { "explode" } else { "hello" };
                dispatch(&lobby_handler, CallRequest::new("lobby", name, vec![]))
            })
        })
        .collect();
    for (index, handle) in handles.into_iter().enumerate() {
        let response = handle.join().expect("dispatch thread must not panic");
        assert_eq!(response.is_error(), index % 2 == 0, "call {index}");
    }
}
