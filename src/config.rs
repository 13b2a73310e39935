/// Tunable limits for the request reader/parser/dispatcher.
///
/// Grouped the way the teacher groups protocol constants near the top of
/// `spec.rs`, rather than scattering magic numbers through the parsers.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Size of the per-connection scratch buffer. A request head (plus any
    /// pipelined tail) must fit entirely within this many bytes.
    pub buffer_size: usize,

    /// Maximum number of non-blocking read iterations per `process_request`
    /// call before giving up with a 408. Bounds slow-loris style clients.
    pub max_read_iterations: u32,

    /// Maximum number of internal URL rewrites a single request may go
    /// through before it is treated as a routing loop (HTTP 500).
    pub max_url_rewrites: u32,

    /// Whether PROXY-protocol v1/v2 preambles are recognized on this
    /// connection. Only meaningful for listeners sitting behind a trusted
    /// load balancer.
    pub allow_proxy_protocol: bool,
}

pub const DEFAULT_BUFFER_SIZE: usize = 4096;

impl Default for Config {
    fn default() -> Self {
        Config {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_read_iterations: 16,
            max_url_rewrites: 4,
            allow_proxy_protocol: false,
        }
    }
}
