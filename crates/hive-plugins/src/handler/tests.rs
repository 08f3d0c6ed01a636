//! Unit tests for the handler context.

use rstest::{fixture, rstest};

use super::*;

#[fixture]
fn ctx() -> Context {
    Context::new(CallRequest::new("lobby", "hello", b"world".to_vec()))
}

#[rstest]
fn context_exposes_request(ctx: Context) {
    assert_eq!(ctx.name(), "hello");
    assert_eq!(ctx.data(), b"world");
}

#[rstest]
fn untouched_context_yields_zero_response(ctx: Context) {
    assert_eq!(ctx.reply_count(), 0);
    assert_eq!(ctx.into_response(), CallResponse::default());
}

#[rstest]
fn reply_sets_status_and_payload(mut ctx: Context) {
    ctx.reply(200, "response[world]");
    let response = ctx.into_response();
    assert_eq!(response.status(), 200);
    assert_eq!(response.payload(), b"response[world]");
    assert!(!response.is_error());
}

#[rstest]
fn second_reply_overwrites_the_first(mut ctx: Context) {
    ctx.reply(200, b"first".to_vec());
    ctx.reply(201, b"second".to_vec());
    assert_eq!(ctx.reply_count(), 2);
    let response = ctx.into_response();
    assert_eq!(response.status(), 201);
    assert_eq!(response.payload(), b"second");
}

#[rstest]
fn fail_keeps_the_recorded_reply(mut ctx: Context) {
    ctx.reply(500, Vec::new());
    ctx.fail("bad input");
    let response = ctx.into_response();
    assert_eq!(response.status(), 500);
    assert!(response.payload().is_empty());
    assert_eq!(response.error(), Some("bad input"));
}

#[rstest]
fn closures_are_handlers(mut ctx: Context) {
    let handler = |ctx: &mut Context| {
        let upper = ctx.data().to_ascii_uppercase();
        ctx.reply(200, upper);
    };
    handler.on(&mut ctx);
    assert_eq!(ctx.into_response().payload(), b"WORLD");
}
