//! The capability plugin authors implement.
//!
//! A plugin binds exactly one [`Handler`] when it starts serving. For every
//! incoming call the dispatch server builds a fresh [`Context`] and passes it
//! to [`Handler::on`]; the handler reads the operation name and payload and
//! records its answer with [`Context::reply`] or [`Context::fail`].

use tracing::warn;

use crate::protocol::{CallRequest, CallResponse};

/// Tracing target for handler context operations.
const HANDLER_TARGET: &str = "hive_plugins::handler";

/// Answers invocations on the plugin side.
///
/// Closures taking `&mut Context` implement the trait directly.
///
/// # Example
///
/// ```
/// use hive_plugins::{CallRequest, Context, Handler};
///
/// struct Echo;
///
/// impl Handler for Echo {
///     fn on(&self, ctx: &mut Context) {
///         let payload = ctx.data().to_vec();
///         ctx.reply(200, payload);
///     }
/// }
///
/// let mut ctx = Context::new(CallRequest::new("echo", "op", b"hi".to_vec()));
/// Echo.on(&mut ctx);
/// assert_eq!(ctx.into_response().payload(), b"hi");
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles one call.
    ///
    /// Panics are caught by the dispatch server and reported to the host as
    /// application errors; the plugin keeps serving.
    fn on(&self, ctx: &mut Context);
}

impl<F> Handler for F
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    fn on(&self, ctx: &mut Context) {
        self(ctx);
    }
}

/// Single-use state of one in-flight call.
///
/// The request is read-only. The response starts zero-valued; `reply` is
/// last-write-wins and each extra reply is logged.
#[derive(Debug)]
pub struct Context {
    request: CallRequest,
    response: CallResponse,
    replies: usize,
}

impl Context {
    /// Wraps an incoming request.
    #[must_use]
    pub fn new(request: CallRequest) -> Self {
        Self {
            request,
            response: CallResponse::default(),
            replies: 0,
        }
    }

    /// Returns the operation name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.request.name()
    }

    /// Returns the request payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.request.payload()
    }

    /// Records the status and payload returned to the host.
    pub fn reply(&mut self, status: i32, payload: impl Into<Vec<u8>>) {
        self.replies += 1;
        if self.replies > 1 {
            warn!(
                target: HANDLER_TARGET,
                operation = self.request.name(),
                replies = self.replies,
                "handler replied more than once; keeping the last reply"
            );
        }
        self.response.set_reply(status, payload.into());
    }

    /// Marks the call as failed with `message`.
    ///
    /// Any status and payload already recorded are kept and delivered to the
    /// host together with the error.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.response.set_error(message.into());
    }

    /// Returns how many times [`Context::reply`] was called.
    #[must_use]
    pub const fn reply_count(&self) -> usize {
        self.replies
    }

    /// Consumes the context, yielding the accumulated response.
    #[must_use]
    pub fn into_response(self) -> CallResponse {
        self.response
    }
}

#[cfg(test)]
mod tests;
