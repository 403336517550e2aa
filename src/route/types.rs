use ipnet::IpNet;
use serde_derive::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

use crate::perf::PerfEvents;

pub type Prefix = IpNet;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NextHop {
    pub address: IpAddr,
    pub ifname: Option<String>,
    pub weight: Option<u32>,
    /// Segment routing label pushed on egress.
    pub mpls_label: Option<u32>,
}

impl NextHop {
    pub fn new(address: IpAddr, ifname: Option<&str>) -> Self {
        NextHop {
            address,
            ifname: ifname.map(str::to_string),
            weight: None,
            mpls_label: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_label(mut self, label: u32) -> Self {
        self.mpls_label = Some(label);
        self
    }
}

impl fmt::Display for NextHop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.address)?;
        if let Some(ifname) = &self.ifname {
            write!(f, "@{}", ifname)?;
        }
        if let Some(label) = self.mpls_label {
            write!(f, " push {}", label)?;
        }
        if let Some(weight) = self.weight {
            write!(f, " weight {}", weight)?;
        }
        Ok(())
    }
}

/// A prefix and its nexthop set. Nexthops are kept in a set, so two routes
/// compare equal regardless of the order their nexthops were listed in.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnicastRoute {
    pub dest: Prefix,
    pub next_hops: BTreeSet<NextHop>,
}

impl UnicastRoute {
    /// Host bits of `dest` are cleared, so `10.0.1.5/24` becomes `10.0.1.0/24`.
    pub fn new(dest: Prefix, next_hops: impl IntoIterator<Item = NextHop>) -> Self {
        UnicastRoute {
            dest: dest.trunc(),
            next_hops: next_hops.into_iter().collect(),
        }
    }

    /// Drops segment routing labels from every nexthop.
    pub fn strip_labels(&mut self) {
        if self.next_hops.iter().all(|nh| nh.mpls_label.is_none()) {
            return;
        }
        self.next_hops = std::mem::take(&mut self.next_hops)
            .into_iter()
            .map(|mut nh| {
                nh.mpls_label = None;
                nh
            })
            .collect();
    }
}

impl fmt::Display for UnicastRoute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} via [", self.dest)?;
        for (i, nh) in self.next_hops.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", nh)?;
        }
        write!(f, "]")
    }
}

/// A complete route table computed upstream for one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteSnapshot {
    pub node_name: String,
    pub unicast_routes: Vec<UnicastRoute>,
    pub perf_events: PerfEvents,
}

impl RouteSnapshot {
    pub fn new(node_name: &str, unicast_routes: Vec<UnicastRoute>) -> Self {
        RouteSnapshot {
            node_name: node_name.to_string(),
            unicast_routes,
            perf_events: PerfEvents::default(),
        }
    }
}

/// Route table keyed by prefix. Used both for the intended table and for the
/// last state acknowledged by the forwarding agent. Keys are always stored
/// with their host bits cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: BTreeMap<Prefix, BTreeSet<NextHop>>,
}

impl RouteTable {
    /// Builds a table from a route list. A prefix listed more than once keeps
    /// its last entry.
    pub fn from_routes(routes: impl IntoIterator<Item = UnicastRoute>) -> Self {
        let mut table = RouteTable::default();
        for route in routes {
            let dest = route.dest.trunc();
            if table.routes.insert(dest, route.next_hops).is_some() {
                log::debug!("duplicate prefix {} in route list, last entry wins", dest);
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn get(&self, prefix: &Prefix) -> Option<&BTreeSet<NextHop>> {
        self.routes.get(&prefix.trunc())
    }

    pub fn contains(&self, prefix: &Prefix) -> bool {
        self.routes.contains_key(&prefix.trunc())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Prefix, &BTreeSet<NextHop>)> {
        self.routes.iter()
    }

    pub fn prefixes(&self) -> Vec<Prefix> {
        self.routes.keys().copied().collect()
    }

    pub fn routes(&self) -> Vec<UnicastRoute> {
        self.routes
            .iter()
            .map(|(dest, next_hops)| UnicastRoute {
                dest: *dest,
                next_hops: next_hops.clone(),
            })
            .collect()
    }

    /// Inserts or replaces the entries for the given routes.
    pub fn add_routes(&mut self, routes: &[UnicastRoute]) {
        for route in routes {
            self.routes.insert(route.dest.trunc(), route.next_hops.clone());
        }
    }

    pub fn delete_routes(&mut self, prefixes: &[Prefix]) {
        for prefix in prefixes {
            self.routes.remove(&prefix.trunc());
        }
    }
}
