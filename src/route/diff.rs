use itertools::{EitherOrBoth, Itertools};

use super::types::{Prefix, RouteTable, UnicastRoute};

/// Minimal change set turning one route table into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteDelta {
    pub to_add: Vec<UnicastRoute>,
    pub to_delete: Vec<Prefix>,
}

impl RouteDelta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty()
    }
}

/// Computes the routes to add and the prefixes to delete so that `current`
/// becomes `desired`.
///
/// A prefix whose nexthop set changed in any way is re-added as a whole; the
/// agent replaces the old entry on add, so it never shows up in `to_delete`.
/// Prefixes present in both tables with identical nexthop sets are left out.
pub fn compute_delta(current: &RouteTable, desired: &RouteTable) -> RouteDelta {
    let mut delta = RouteDelta::default();

    for entry in current
        .iter()
        .merge_join_by(desired.iter(), |(a, _), (b, _)| a.cmp(b))
    {
        match entry {
            EitherOrBoth::Left((prefix, _)) => delta.to_delete.push(*prefix),
            EitherOrBoth::Right((prefix, next_hops)) => delta.to_add.push(UnicastRoute {
                dest: *prefix,
                next_hops: next_hops.clone(),
            }),
            EitherOrBoth::Both((_, old), (prefix, new)) => {
                if old != new {
                    delta.to_add.push(UnicastRoute {
                        dest: *prefix,
                        next_hops: new.clone(),
                    });
                }
            }
        }
    }

    delta
}
