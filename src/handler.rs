//! The handler invocation boundary. Grounded on `HttpRequestHandler` in the
//! teacher's `server.rs`: an async trait object invoked once per request,
//! taking the parsed request and an opaque response sink.

use async_trait::async_trait;

use crate::auth::Authorizer;
use crate::request::Request;
use crate::response::ResponseSink;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        request: &mut Request<'_>,
        response: &mut dyn ResponseSink,
        authorizer: &dyn Authorizer,
    );
}
