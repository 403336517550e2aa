// File: src/agent/netlink.rs
//
// Kernel forwarding plane programmed over rtnetlink. Routes installed by this
// agent are tagged with a private protocol id, so a full sync only ever
// removes routes it owns.

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use netlink_packet_route::route::{RouteAddress, RouteAttribute, RouteMessage, RouteProtocol};
use rtnetlink::{new_connection, Handle, IpVersion};
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use super::FibAgent;
use crate::error::AgentError;
use crate::route::{Prefix, UnicastRoute};

const UFIB_PROTOCOL: u8 = 99;

pub struct NetlinkAgent {
    handle: Handle,
    table: u32,
}

impl fmt::Debug for NetlinkAgent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NetlinkAgent")
            .field("table", &self.table)
            .finish()
    }
}

fn transport(e: rtnetlink::Error) -> AgentError {
    AgentError::Transport(e.to_string())
}

fn route_table(msg: &RouteMessage) -> u32 {
    msg.attributes
        .iter()
        .find_map(|a| match a {
            RouteAttribute::Table(t) => Some(*t),
            _ => None,
        })
        .unwrap_or(msg.header.table as u32)
}

fn destination(msg: &RouteMessage) -> Option<IpNet> {
    let len = msg.header.destination_prefix_length;
    msg.attributes.iter().find_map(|a| match a {
        RouteAttribute::Destination(RouteAddress::Inet(addr)) => {
            Ipv4Net::new(*addr, len).ok().map(IpNet::V4)
        }
        RouteAttribute::Destination(RouteAddress::Inet6(addr)) => {
            Ipv6Net::new(*addr, len).ok().map(IpNet::V6)
        }
        _ => None,
    })
}

impl NetlinkAgent {
    pub fn connect(table: u32) -> std::io::Result<Self> {
        let (connection, handle, _) = new_connection()?;
        tokio::spawn(connection);
        Ok(NetlinkAgent { handle, table })
    }

    async fn ifindex(&self, ifname: &str) -> Result<u32, AgentError> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(ifname.to_string())
            .execute();
        match links.try_next().await {
            Ok(Some(link)) => Ok(link.header.index),
            Ok(None) => Err(AgentError::Rejected(format!("no interface {}", ifname))),
            Err(e) => Err(transport(e)),
        }
    }

    async fn owned_routes(&self) -> Result<Vec<RouteMessage>, AgentError> {
        let mut owned = vec![];
        for version in [IpVersion::V4, IpVersion::V6] {
            let mut routes = self.handle.route().get(version).execute();
            while let Some(msg) = routes.try_next().await.map_err(transport)? {
                if msg.header.protocol == RouteProtocol::Other(UFIB_PROTOCOL)
                    && route_table(&msg) == self.table
                {
                    owned.push(msg);
                }
            }
        }
        Ok(owned)
    }

    async fn install(&self, route: &UnicastRoute) -> Result<(), AgentError> {
        let nh = route
            .next_hops
            .iter()
            .next()
            .ok_or_else(|| AgentError::Unsupported(format!("{} has no nexthops", route.dest)))?;
        if route.next_hops.len() > 1 {
            log::warn!(
                "{}: kernel agent installs a single path, using {}",
                route.dest,
                nh
            );
        }
        if nh.mpls_label.is_some() {
            return Err(AgentError::Unsupported(format!(
                "{}: labelled nexthops are not supported by the kernel agent",
                route.dest
            )));
        }
        let oif = match &nh.ifname {
            Some(name) => Some(self.ifindex(name).await?),
            None => None,
        };

        match (route.dest, nh.address) {
            (IpNet::V4(net), IpAddr::V4(gw)) => {
                let mut req = self
                    .handle
                    .route()
                    .add()
                    .v4()
                    .destination_prefix(net.network(), net.prefix_len())
                    .gateway(gw)
                    .table_id(self.table)
                    .replace();
                if let Some(oif) = oif {
                    req = req.output_interface(oif);
                }
                req.message_mut().header.protocol = RouteProtocol::Other(UFIB_PROTOCOL);
                req.execute()
                    .await
                    .map_err(|e| AgentError::Rejected(format!("{}: {}", route.dest, e)))
            }
            (IpNet::V6(net), IpAddr::V6(gw)) => {
                let mut req = self
                    .handle
                    .route()
                    .add()
                    .v6()
                    .destination_prefix(net.network(), net.prefix_len())
                    .gateway(gw)
                    .table_id(self.table)
                    .replace();
                if let Some(oif) = oif {
                    req = req.output_interface(oif);
                }
                req.message_mut().header.protocol = RouteProtocol::Other(UFIB_PROTOCOL);
                req.execute()
                    .await
                    .map_err(|e| AgentError::Rejected(format!("{}: {}", route.dest, e)))
            }
            _ => Err(AgentError::Unsupported(format!(
                "{}: nexthop {} is of a different address family",
                route.dest, nh.address
            ))),
        }
    }

    async fn remove_matching(
        &self,
        keep: impl Fn(&IpNet) -> bool,
    ) -> Result<usize, AgentError> {
        let mut removed = 0;
        for msg in self.owned_routes().await? {
            let dest = match destination(&msg) {
                Some(d) => d,
                None => continue,
            };
            if keep(&dest) {
                continue;
            }
            log::debug!("removing kernel route {}", dest);
            self.handle
                .route()
                .del(msg)
                .execute()
                .await
                .map_err(|e| AgentError::Rejected(format!("{}: {}", dest, e)))?;
            removed += 1;
        }
        Ok(removed)
    }
}

#[async_trait]
impl FibAgent for NetlinkAgent {
    async fn add_routes(&self, routes: Vec<UnicastRoute>) -> Result<(), AgentError> {
        for route in &routes {
            self.install(route).await?;
        }
        Ok(())
    }

    async fn delete_routes(&self, prefixes: Vec<Prefix>) -> Result<(), AgentError> {
        let doomed: HashSet<Prefix> = prefixes.iter().map(|p| p.trunc()).collect();
        self.remove_matching(|dest| !doomed.contains(dest)).await?;
        Ok(())
    }

    async fn sync_routes(&self, routes: Vec<UnicastRoute>) -> Result<(), AgentError> {
        for route in &routes {
            self.install(route).await?;
        }
        let wanted: HashSet<Prefix> = routes.iter().map(|r| r.dest.trunc()).collect();
        let removed = self.remove_matching(|dest| wanted.contains(dest)).await?;
        log::debug!(
            "kernel sync: {} routes installed, {} stale removed",
            wanted.len(),
            removed
        );
        Ok(())
    }
}
