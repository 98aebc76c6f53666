use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::Router::context::{InitFlags, SendTimeout, TransportContext};
use crate::Router::error::{Result, RouterError};
use crate::Router::routes::{host_of, RouteTable};
use crate::Transport::local::{LocalTransport, MAX_RCV_BYTES};

pub const ENV_SEED_RT: &str = "DMXP_SEED_RT";
pub const ENV_SRC_ID: &str = "DMXP_SRC_ID";
pub const ENV_QUEUE_DEPTH: &str = "DMXP_QUEUE_DEPTH";
pub const ENV_CALL_TIMEOUT_MS: &str = "DMXP_CALL_TIMEOUT_MS";

pub const DEFAULT_BIND: &str = "4560";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ContextBuilder {
    bind: String,
    source_host: String,
    max_receive_size: usize,
    flags: InitFlags,
    queue_depth: usize,
    send_timeout: SendTimeout,
    call_timeout: Duration,
    routes: RouteTable,
    seed_route_file: Option<PathBuf>,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            source_host: DEFAULT_HOST.to_string(),
            max_receive_size: 0, // provider default
            flags: InitFlags::NONE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            send_timeout: SendTimeout::DEFAULT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            routes: RouteTable::new(),
            seed_route_file: None,
        }
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `"4560"`, `":4560"`, `"tcp:4560"` or `"host:4560"`.
    pub fn bind(mut self, spec: &str) -> Self {
        self.bind = spec.to_string();
        self
    }

    /// Host part used when the bind spec names only a port.
    pub fn source_host(mut self, host: &str) -> Self {
        self.source_host = host.to_string();
        self
    }

    pub fn max_receive_size(mut self, size: usize) -> Self {
        self.max_receive_size = size;
        self
    }

    pub fn flags(mut self, flags: InitFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Mailbox slots; rounded up to a power of two.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn send_timeout(mut self, value: i32) -> Self {
        self.send_timeout = SendTimeout::new(value);
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Routes added in code; merged over the seed file. Bare ports take the
    /// context's host.
    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    pub fn seed_route_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.seed_route_file = Some(path.into());
        self
    }

    /// Apply `DMXP_SEED_RT`, `DMXP_SRC_ID`, `DMXP_QUEUE_DEPTH` and
    /// `DMXP_CALL_TIMEOUT_MS` when set. Unparseable values are ignored.
    pub fn with_env(mut self) -> Self {
        if let Ok(path) = env::var(ENV_SEED_RT) {
            if !path.is_empty() {
                self.seed_route_file = Some(PathBuf::from(path));
            }
        }
        if let Ok(host) = env::var(ENV_SRC_ID) {
            if !host.is_empty() {
                self.source_host = host;
            }
        }
        if let Some(depth) = env_number::<usize>(ENV_QUEUE_DEPTH) {
            self.queue_depth = depth;
        }
        if let Some(ms) = env_number::<u64>(ENV_CALL_TIMEOUT_MS) {
            self.call_timeout = Duration::from_millis(ms);
        }
        self
    }

    pub fn build(mut self) -> Result<TransportContext> {
        let endpoint = parse_bind(&self.bind, &self.source_host).map_err(|reason| RouterError::init(&self.bind, reason))?;

        let mut routes = match &self.seed_route_file {
            Some(path) => RouteTable::load(path, &endpoint)?,
            None => RouteTable::new(),
        };
        self.routes.qualify(host_of(&endpoint));
        routes.merge(self.routes);

        let max_receive_size = if self.max_receive_size == 0 {
            MAX_RCV_BYTES
        } else {
            self.max_receive_size
        };
        let depth = self
            .queue_depth
            .max(2)
            .checked_next_power_of_two()
            .ok_or_else(|| RouterError::init(&self.bind, format!("queue depth {} too large", self.queue_depth)))?;

        let transport = LocalTransport::bind(&endpoint, depth, max_receive_size, routes)
            .map_err(|e| RouterError::init(&self.bind, e.to_string()))?;

        Ok(TransportContext::from_parts(
            Box::new(transport),
            max_receive_size,
            self.flags,
            self.send_timeout,
            self.call_timeout,
        ))
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

/// Resolve a bind spec to the `host:port` endpoint name.
pub fn parse_bind(spec: &str, default_host: &str) -> std::result::Result<String, String> {
    let spec = spec.trim();
    let spec = spec.strip_prefix("tcp:").unwrap_or(spec);
    let (host, port) = match spec.rsplit_once(':') {
        Some((host, port)) => (host.trim(), port.trim()),
        None => ("", spec),
    };
    let port: u16 = port
        .parse()
        .map_err(|_| format!("bad port {port:?}"))?;
    let host = if host.is_empty() { default_host } else { host };
    Ok(format!("{host}:{port}"))
}
