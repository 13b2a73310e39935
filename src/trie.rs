//! URL routing. The spec only requires longest-prefix matching behind a
//! trait boundary (`SPEC_FULL.md` §6); this module's `PrefixRouter` is the
//! minimal in-crate implementation it calls for, kept intentionally simple
//! (a sorted `Vec` scanned back-to-front) since production embedders are
//! expected to supply their own `Router` backed by whatever structure suits
//! their route count.

use std::sync::Arc;

use crate::handler::Handler;

/// Flags a route declares about how the dispatch driver should prepare the
/// request before invoking the handler. Named directly after the
/// "Handler-map flags" list in `SPEC_FULL.md` §6.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerFlags {
    pub parse_query_string: bool,
    pub parse_if_modified_since: bool,
    pub parse_range: bool,
    pub parse_accept_encoding: bool,
    pub parse_cookies: bool,
    pub parse_post_data: bool,
    pub must_authorize: bool,
    pub remove_leading_slash: bool,
    pub can_rewrite_url: bool,
}

pub struct HandlerEntry {
    pub prefix: String,
    pub flags: HandlerFlags,
    pub handler: Arc<dyn Handler>,
}

pub trait Router: Send + Sync {
    /// Returns the entry whose `prefix` is the longest registered prefix of
    /// `url`, or `None` if no registered prefix matches.
    fn lookup_prefix(&self, url: &str) -> Option<&HandlerEntry>;
}

/// A `Router` built from a fixed list of prefixes, sorted longest-first so
/// the first match found is also the longest.
pub struct PrefixRouter {
    entries: Vec<HandlerEntry>,
}

impl PrefixRouter {
    pub fn new(mut entries: Vec<HandlerEntry>) -> Self {
        entries.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        PrefixRouter { entries }
    }
}

impl Router for PrefixRouter {
    fn lookup_prefix(&self, url: &str) -> Option<&HandlerEntry> {
        self.entries
            .iter()
            .find(|entry| url.starts_with(entry.prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::auth::Authorizer;
    use crate::request::Request;
    use crate::response::ResponseSink;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn handle(
            &self,
            _request: &mut Request<'_>,
            _response: &mut dyn ResponseSink,
            _authorizer: &dyn Authorizer,
        ) {
        }
    }

    fn entry(prefix: &str) -> HandlerEntry {
        HandlerEntry {
            prefix: prefix.to_string(),
            flags: HandlerFlags::default(),
            handler: Arc::new(NoopHandler),
        }
    }

    fn router() -> PrefixRouter {
        PrefixRouter::new(vec![entry("/"), entry("/api"), entry("/api/v1")])
    }

    #[test]
    fn picks_longest_matching_prefix() {
        let r = router();
        assert_eq!(r.lookup_prefix("/api/v1/users").unwrap().prefix, "/api/v1");
        assert_eq!(r.lookup_prefix("/api/other").unwrap().prefix, "/api");
        assert_eq!(r.lookup_prefix("/elsewhere").unwrap().prefix, "/");
    }

    #[test]
    fn no_match_without_root() {
        let r = PrefixRouter::new(vec![entry("/api")]);
        assert!(r.lookup_prefix("/other").is_none());
    }
}
