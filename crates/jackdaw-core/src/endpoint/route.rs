//! Route table: endpoints addressed by slash-separated paths
//!
//! Routes look like `/timeline/track_1/fir_filter/cutoff`. Each component is
//! lower-cased and every character outside `[a-z0-9]` becomes `_`. Lookup is
//! a fixed table of [`API_HASH_TABLE_SIZE`] chained buckets keyed by djb2.

use super::Endpoint;

/// Number of buckets
pub const API_HASH_TABLE_SIZE: usize = 1024;

/// djb2 (`hash = hash * 33 + c`, seeded with 5381) reduced to a bucket index
pub fn djb2(route: &str) -> usize {
    let hash = route
        .bytes()
        .fold(5381u64, |h, c| (h << 5).wrapping_add(h).wrapping_add(c as u64));
    (hash % API_HASH_TABLE_SIZE as u64) as usize
}

/// Normalize one route component
pub fn sanitize_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

/// Join components into a route
pub fn make_route<S: AsRef<str>>(components: &[S]) -> String {
    let mut route = String::new();
    for c in components {
        route.push('/');
        route.push_str(&sanitize_component(c.as_ref()));
    }
    route
}

struct Node {
    route: String,
    ep: Endpoint,
}

/// Route to endpoint lookup
pub struct RouteTable {
    buckets: Vec<Vec<Node>>,
    len: usize,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            buckets: (0..API_HASH_TABLE_SIZE).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Register `ep` under `parent` components plus its local id
    ///
    /// Returns the route. An existing registration under the same route is
    /// replaced.
    pub fn register<S: AsRef<str>>(&mut self, parent: &[S], ep: &Endpoint) -> String {
        let mut components: Vec<&str> = parent.iter().map(|s| s.as_ref()).collect();
        components.push(ep.local_id());
        let route = make_route(&components);
        self.insert(route.clone(), ep.clone());
        route
    }

    /// Insert under an already formatted route
    pub fn insert(&mut self, route: String, ep: Endpoint) {
        let bucket = &mut self.buckets[djb2(&route)];
        if let Some(node) = bucket.iter_mut().find(|n| n.route == route) {
            node.ep = ep;
            return;
        }
        bucket.push(Node { route, ep });
        self.len += 1;
    }

    pub fn get(&self, route: &str) -> Option<&Endpoint> {
        self.buckets[djb2(route)]
            .iter()
            .find(|n| n.route == route)
            .map(|n| &n.ep)
    }

    pub fn remove(&mut self, route: &str) -> Option<Endpoint> {
        let bucket = &mut self.buckets[djb2(route)];
        let idx = bucket.iter().position(|n| n.route == route)?;
        self.len -= 1;
        Some(bucket.swap_remove(idx).ep)
    }

    /// Move every route under `old_prefix` to `new_prefix`
    ///
    /// Used when a track or effect is renamed. Returns the number moved.
    pub fn rename_prefix(&mut self, old_prefix: &str, new_prefix: &str) -> usize {
        let old_dir = format!("{}/", old_prefix.trim_end_matches('/'));
        let new_dir = format!("{}/", new_prefix.trim_end_matches('/'));
        let mut moved = Vec::new();
        for bucket in &mut self.buckets {
            let mut i = 0;
            while i < bucket.len() {
                if bucket[i].route.starts_with(&old_dir) {
                    moved.push(bucket.swap_remove(i));
                } else {
                    i += 1;
                }
            }
        }
        self.len -= moved.len();
        let count = moved.len();
        for node in moved {
            let route = format!("{}{}", new_dir, &node.route[old_dir.len()..]);
            self.insert(route, node.ep);
        }
        count
    }

    /// All routes, unordered
    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().flatten().map(|n| n.route.as_str())
    }

    /// Number of entries in the fullest bucket
    pub fn max_chain_len(&self) -> usize {
        self.buckets.iter().map(Vec::len).max().unwrap_or(0)
    }
}
