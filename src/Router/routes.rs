//! Static message-type to endpoint-group routing.
//!
//! Text form, one record per line:
//!
//! ```text
//! newrt|start
//! rte|<mtype>[,<sender>]|<group>[;<group>...]
//! mse|<mtype>[,<sender>]|<sub-id>|<group>[;<group>...]
//! del|<mtype>[,<sender>]|<sub-id>
//! newrt|end
//! ```
//!
//! A group is a comma separated list of endpoints. Each group of a matching
//! entry receives one copy of a message; within a group endpoints take turns.
//! A sender restriction keeps a record only on the endpoint it names. A bare
//! port names an endpoint on the local host: the host of the endpoint the
//! table is parsed for, or of the context the table is handed to.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::Router::builder::DEFAULT_HOST;
use crate::Router::error::{Result, RouterError};

/// Sub-id written in route records to mean "no subscription".
pub const ANY_SUB_ID: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RouteKey {
    mtype: i32,
    sub_id: Option<i32>,
}

#[derive(Debug)]
struct EndpointGroup {
    endpoints: Vec<String>,
    next: AtomicUsize,
}

impl EndpointGroup {
    fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            next: AtomicUsize::new(0),
        }
    }

    fn pick(&self) -> &str {
        let turn = self.next.fetch_add(1, Ordering::Relaxed);
        &self.endpoints[turn % self.endpoints.len()]
    }
}

impl Clone for EndpointGroup {
    fn clone(&self) -> Self {
        Self::new(self.endpoints.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: HashMap<RouteKey, Vec<EndpointGroup>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every record regardless of sender restrictions. Bare ports
    /// resolve to `localhost`.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_records(text, None, DEFAULT_HOST)
    }

    /// Parse keeping only records without a sender list or whose sender list
    /// names `local_endpoint`. Bare ports resolve to its host.
    pub fn parse_for(text: &str, local_endpoint: &str) -> Result<Self> {
        Self::parse_records(text, Some(local_endpoint), host_of(local_endpoint))
    }

    pub fn load(path: impl AsRef<Path>, local_endpoint: &str) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let table = Self::parse_for(&text, local_endpoint)?;
        tracing::debug!(path = %path.display(), entries = table.len(), "route table loaded");
        Ok(table)
    }

    fn parse_records(text: &str, local: Option<&str>, host: &str) -> Result<Self> {
        let mut table = Self::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            let bad = |reason: &str| RouterError::RouteTable {
                line: line_no,
                reason: reason.to_string(),
            };

            match fields[0] {
                "newrt" => continue,
                "rte" => {
                    if fields.len() < 3 {
                        return Err(bad("rte record needs 3 fields"));
                    }
                    let (mtype, applies) = parse_type_field(fields[1], local, host).map_err(|r| bad(&r))?;
                    let groups = parse_groups(fields[2], host).map_err(|r| bad(&r))?;
                    if applies {
                        table.insert(RouteKey { mtype, sub_id: None }, groups);
                    }
                }
                "mse" => {
                    if fields.len() < 4 {
                        return Err(bad("mse record needs 4 fields"));
                    }
                    let (mtype, applies) = parse_type_field(fields[1], local, host).map_err(|r| bad(&r))?;
                    let sub_id = parse_sub_id(fields[2]).map_err(|r| bad(&r))?;
                    let groups = parse_groups(fields[3], host).map_err(|r| bad(&r))?;
                    if applies {
                        table.insert(RouteKey { mtype, sub_id }, groups);
                    }
                }
                "del" => {
                    if fields.len() < 3 {
                        return Err(bad("del record needs 3 fields"));
                    }
                    let (mtype, applies) = parse_type_field(fields[1], local, host).map_err(|r| bad(&r))?;
                    let sub_id = parse_sub_id(fields[2]).map_err(|r| bad(&r))?;
                    if applies {
                        table.entries.remove(&RouteKey { mtype, sub_id });
                    }
                }
                other => return Err(bad(&format!("unknown record type {other:?}"))),
            }
        }
        Ok(table)
    }

    /// Add or replace the entry for `(mtype, sub_id)`. Bare ports stay bare
    /// until the table is handed to a context, which qualifies them with its host.
    pub fn add_route<G, E>(&mut self, mtype: i32, sub_id: Option<i32>, groups: G)
    where
        G: IntoIterator<Item = E>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        let groups: Vec<EndpointGroup> = groups
            .into_iter()
            .map(|g| {
                let endpoints = g
                    .into_iter()
                    .map(|ep| {
                        let ep: String = ep.into();
                        ep.trim().to_string()
                    })
                    .filter(|ep| !ep.is_empty())
                    .collect();
                EndpointGroup::new(endpoints)
            })
            .filter(|g| !g.endpoints.is_empty())
            .collect();
        if !groups.is_empty() {
            self.insert(RouteKey { mtype, sub_id }, groups);
        }
    }

    /// Builder form of `add_route`.
    pub fn route<G, E>(mut self, mtype: i32, sub_id: Option<i32>, groups: G) -> Self
    where
        G: IntoIterator<Item = E>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        self.add_route(mtype, sub_id, groups);
        self
    }

    fn insert(&mut self, key: RouteKey, groups: Vec<EndpointGroup>) {
        self.entries.insert(key, groups);
    }

    /// Endpoints for one send: one per group. Tries the exact
    /// `(mtype, sub_id)` entry first, then the type-only entry.
    pub fn resolve(&self, mtype: i32, sub_id: Option<i32>) -> Option<Vec<String>> {
        let groups = sub_id
            .and_then(|sid| self.entries.get(&RouteKey { mtype, sub_id: Some(sid) }))
            .or_else(|| self.entries.get(&RouteKey { mtype, sub_id: None }))?;
        Some(groups.iter().map(|g| g.pick().to_string()).collect())
    }

    /// Every endpoint named anywhere in the table (may repeat).
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.entries
            .values()
            .flat_map(|groups| groups.iter())
            .flat_map(|g| g.endpoints.iter().map(String::as_str))
    }

    /// Give every bare-port endpoint the host `host`.
    pub fn qualify(&mut self, host: &str) {
        for group in self.entries.values_mut().flatten() {
            for ep in group.endpoints.iter_mut() {
                if !ep.contains(':') {
                    *ep = normalize_endpoint(ep, host);
                }
            }
        }
    }

    /// Entries of `other` replace entries with the same key.
    pub fn merge(&mut self, other: RouteTable) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `<mtype>[,<sender>[;<sender>...]]` -> (mtype, record applies here).
fn parse_type_field(field: &str, local: Option<&str>, host: &str) -> std::result::Result<(i32, bool), String> {
    let (mtype, senders) = match field.split_once(',') {
        Some((m, s)) => (m.trim(), Some(s)),
        None => (field, None),
    };
    let mtype = mtype
        .parse::<i32>()
        .map_err(|_| format!("bad message type {mtype:?}"))?;
    let applies = match (senders, local) {
        (Some(senders), Some(local)) => senders
            .split(';')
            .map(|s| normalize_endpoint(s.trim(), host))
            .any(|s| s == local),
        _ => true,
    };
    Ok((mtype, applies))
}

fn parse_sub_id(field: &str) -> std::result::Result<Option<i32>, String> {
    let sid = field
        .parse::<i32>()
        .map_err(|_| format!("bad subscription id {field:?}"))?;
    Ok((sid != ANY_SUB_ID).then_some(sid))
}

fn parse_groups(field: &str, host: &str) -> std::result::Result<Vec<EndpointGroup>, String> {
    let groups: Vec<EndpointGroup> = field
        .split(';')
        .map(|g| {
            g.split(',')
                .map(str::trim)
                .filter(|ep| !ep.is_empty())
                .map(|ep| normalize_endpoint(ep, host))
                .collect::<Vec<_>>()
        })
        .filter(|eps| !eps.is_empty())
        .map(EndpointGroup::new)
        .collect();
    if groups.is_empty() {
        return Err(String::from("no endpoints"));
    }
    Ok(groups)
}

/// A bare port means `host`.
pub(crate) fn normalize_endpoint(ep: &str, host: &str) -> String {
    if ep.contains(':') {
        ep.to_string()
    } else {
        format!("{host}:{ep}")
    }
}

/// Host part of a `host:port` endpoint name.
pub(crate) fn host_of(endpoint: &str) -> &str {
    match endpoint.rsplit_once(':') {
        Some((host, _)) if !host.is_empty() => host,
        _ => DEFAULT_HOST,
    }
}
