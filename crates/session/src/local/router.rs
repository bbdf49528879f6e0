//! Key routing strategies for the in-process service.
//!
//! Every router maps a key to the index of a node in the node list it was
//! built from. Routers are rebuilt from scratch whenever the node set or the
//! strategy changes; only the bounded-load router carries state between
//! picks (the per-node load).

use ring_layout::{Algorithm, CapacityConfig};

/// Second-seed mixer for strategies that need two independent hash streams.
const ALT_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Jump hash multiplier.
const JUMP_MULTIPLIER: u64 = 2_862_933_555_777_941_757;

/// Seeded 64-bit xxHash.
///
/// The seed is prepended to the input as 8 little-endian bytes and the
/// buffer is hashed with seed 0, so positions agree with the remote service.
pub fn xxh64(data: &[u8], seed: u64) -> u64 {
    let mut buf = Vec::with_capacity(8 + data.len());
    buf.extend_from_slice(&seed.to_le_bytes());
    buf.extend_from_slice(data);
    xxhash_rust::xxh64::xxh64(&buf, 0)
}

/// Maps a hash onto `[0, 1)`.
pub fn unit_position(hash: u64) -> f64 {
    (hash >> 11) as f64 / (1u64 << 53) as f64
}

/// Router parameters shared by all strategies.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RouterOptions {
    /// Maglev lookup table size. Should be prime.
    pub table_size: usize,
    /// Virtual nodes per node for the plain ring.
    pub ring_vnodes: usize,
    /// Virtual nodes per node for the bounded-load ring.
    pub bounded_vnodes: usize,
    /// Ring steps before the bounded-load router tries a second candidate.
    pub walk_threshold: usize,
    pub hash_seed: u64,
    pub capacity: CapacityConfig,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            table_size: 65_537,
            ring_vnodes: 50,
            bounded_vnodes: 100,
            walk_threshold: 8,
            hash_seed: 42,
            capacity: CapacityConfig::default(),
        }
    }
}

/// A key → node strategy.
///
/// `pick` takes `&mut self` because bounded-load routing tracks how many
/// keys each node has accepted so far.
pub trait Router: Send {
    /// Index of the node that owns `key`, `None` if no node can take it.
    fn pick(&mut self, key: &[u8]) -> Option<usize>;

    /// Strategy name (for logging).
    fn name(&self) -> &'static str;
}

/// Builds the router for `algorithm` over `nodes`.
///
/// Returns `None` when there are no nodes. Tags without a local router fall
/// back to the plain ring.
pub fn build(algorithm: &Algorithm, options: &RouterOptions, nodes: &[String]) -> Option<Box<dyn Router>> {
    if nodes.is_empty() {
        return None;
    }
    let router: Box<dyn Router> = match algorithm {
        Algorithm::Jump => Box::new(JumpRouter::new(nodes.len())),
        Algorithm::Maglev => Box::new(MaglevRouter::new(nodes, options)),
        Algorithm::BoundedLoad => Box::new(BoundedLoadRouter::new(nodes, options)),
        Algorithm::Ring | Algorithm::Other(_) => Box::new(VnodeRing::new(
            nodes,
            options.ring_vnodes,
            options.hash_seed,
        )),
    };
    Some(router)
}

// ============================================================================
// Virtual node ring
// ============================================================================

#[derive(Copy, Clone, Debug)]
struct Token {
    hash: u64,
    node: usize,
}

/// Plain consistent hashing: a key belongs to the first virtual node
/// clockwise from its hash.
#[derive(Clone, Debug)]
pub struct VnodeRing {
    tokens: Vec<Token>,
    seed: u64,
}

impl VnodeRing {
    pub fn new(nodes: &[String], vnodes: usize, seed: u64) -> Self {
        let vnodes = vnodes.max(1);
        let mut tokens = Vec::with_capacity(nodes.len() * vnodes);
        for (node, id) in nodes.iter().enumerate() {
            for v in 0..vnodes {
                let label = format!("{}#{}-{}", id, v, seed);
                tokens.push(Token {
                    hash: xxh64(label.as_bytes(), seed),
                    node,
                });
            }
        }
        tokens.sort_by_key(|token| token.hash);
        Self { tokens, seed }
    }

    /// Index of the first token at or after `hash`, wrapping to 0.
    fn successor(&self, hash: u64) -> usize {
        let idx = self.tokens.partition_point(|token| token.hash < hash);
        if idx == self.tokens.len() {
            0
        } else {
            idx
        }
    }

    fn len(&self) -> usize {
        self.tokens.len()
    }
}

impl Router for VnodeRing {
    fn pick(&mut self, key: &[u8]) -> Option<usize> {
        if self.tokens.is_empty() {
            return None;
        }
        let idx = self.successor(xxh64(key, self.seed));
        Some(self.tokens[idx].node)
    }

    fn name(&self) -> &'static str {
        "ring"
    }
}

// ============================================================================
// Jump hash
// ============================================================================

/// Jump consistent hashing over `buckets` nodes.
#[derive(Copy, Clone, Debug)]
pub struct JumpRouter {
    buckets: usize,
}

impl JumpRouter {
    pub fn new(buckets: usize) -> Self {
        Self { buckets }
    }
}

impl Router for JumpRouter {
    fn pick(&mut self, key: &[u8]) -> Option<usize> {
        if self.buckets == 0 {
            return None;
        }
        let mut hash = xxh64(key, 0);
        let mut bucket: i64 = -1;
        let mut next: i64 = 0;
        while next < self.buckets as i64 {
            bucket = next;
            hash = hash.wrapping_mul(JUMP_MULTIPLIER).wrapping_add(1);
            next = ((bucket + 1) as f64 * ((1u64 << 31) as f64 / ((hash >> 33) + 1) as f64)) as i64;
        }
        Some(bucket as usize)
    }

    fn name(&self) -> &'static str {
        "jump"
    }
}

// ============================================================================
// Maglev
// ============================================================================

/// Maglev lookup table: every slot is owned by exactly one node, filled
/// round-robin from per-node permutations.
#[derive(Clone, Debug)]
pub struct MaglevRouter {
    table: Vec<usize>,
    seed: u64,
}

impl MaglevRouter {
    pub fn new(nodes: &[String], options: &RouterOptions) -> Self {
        let size = options.table_size.max(2);
        let seed = options.hash_seed;
        if nodes.is_empty() {
            return Self {
                table: Vec::new(),
                seed,
            };
        }

        let mut permutations: Vec<(usize, usize, usize)> = nodes
            .iter()
            .map(|id| {
                let offset = (xxh64(id.as_bytes(), seed) % size as u64) as usize;
                let skip = (xxh64(id.as_bytes(), seed ^ ALT_SEED) % (size as u64 - 1)) as usize + 1;
                (offset, skip, 0)
            })
            .collect();

        let mut table: Vec<Option<usize>> = vec![None; size];
        let mut filled = 0;
        'fill: while filled < size {
            for (node, (offset, skip, next)) in permutations.iter_mut().enumerate() {
                let slot = (*offset + *next * *skip) % size;
                *next += 1;
                if table[slot].is_none() {
                    table[slot] = Some(node);
                    filled += 1;
                    if filled == size {
                        break 'fill;
                    }
                }
            }
        }

        Self {
            table: table.into_iter().map(|owner| owner.unwrap_or(0)).collect(),
            seed,
        }
    }
}

impl Router for MaglevRouter {
    fn pick(&mut self, key: &[u8]) -> Option<usize> {
        if self.table.is_empty() {
            return None;
        }
        let slot = (xxh64(key, self.seed) % self.table.len() as u64) as usize;
        Some(self.table[slot])
    }

    fn name(&self) -> &'static str {
        "maglev"
    }
}

// ============================================================================
// Bounded loads
// ============================================================================

/// Consistent hashing with bounded loads.
///
/// Walks clockwise from the key's hash until it finds a node under
/// `ceil(load_factor * expected_keys / nodes)`. After `walk_threshold` steps
/// it compares the current node with a second candidate hashed with an
/// independent seed and takes the less loaded one with room.
#[derive(Clone, Debug)]
pub struct BoundedLoadRouter {
    ring: VnodeRing,
    load: Vec<u64>,
    capacity: u64,
    walk_threshold: usize,
    seed: u64,
    alt_seed: u64,
}

impl BoundedLoadRouter {
    pub fn new(nodes: &[String], options: &RouterOptions) -> Self {
        let seed = if options.hash_seed == 0 { 1 } else { options.hash_seed };
        Self {
            ring: VnodeRing::new(nodes, options.bounded_vnodes, seed),
            load: vec![0; nodes.len()],
            capacity: options.capacity.capacity_per_node(nodes.len()),
            walk_threshold: options.walk_threshold.max(1),
            seed,
            alt_seed: seed ^ ALT_SEED,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn has_room(&self, node: usize) -> bool {
        self.load[node] < self.capacity
    }

    fn second_choice(&self, key: &[u8], primary: usize) -> Option<usize> {
        let idx = self.ring.successor(xxh64(key, self.alt_seed));
        let secondary = self.ring.tokens[idx].node;
        match (self.has_room(primary), self.has_room(secondary)) {
            (false, false) => None,
            (true, false) => Some(primary),
            (false, true) => Some(secondary),
            (true, true) if self.load[primary] <= self.load[secondary] => Some(primary),
            (true, true) => Some(secondary),
        }
    }
}

impl Router for BoundedLoadRouter {
    fn pick(&mut self, key: &[u8]) -> Option<usize> {
        if self.ring.len() == 0 {
            return None;
        }
        let start = self.ring.successor(xxh64(key, self.seed));
        let mut idx = start;
        let mut steps = 0;

        loop {
            let node = self.ring.tokens[idx].node;
            if self.has_room(node) {
                self.load[node] += 1;
                return Some(node);
            }

            steps += 1;
            if steps == self.walk_threshold {
                if let Some(chosen) = self.second_choice(key, node) {
                    self.load[chosen] += 1;
                    return Some(chosen);
                }
            }

            idx = (idx + 1) % self.ring.len();
            if idx == start {
                // every node is full
                return None;
            }
        }
    }

    fn name(&self) -> &'static str {
        "chbl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("node-{}", i)).collect()
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("key-{}", i)).collect()
    }

    fn assign(router: &mut dyn Router, keys: &[String]) -> Vec<Option<usize>> {
        keys.iter().map(|key| router.pick(key.as_bytes())).collect()
    }

    #[test]
    fn test_build_selects_router() {
        let options = RouterOptions::default();
        let nodes = nodes(3);
        let cases = [
            (Algorithm::Ring, "ring"),
            (Algorithm::Jump, "jump"),
            (Algorithm::Maglev, "maglev"),
            (Algorithm::BoundedLoad, "chbl"),
            (Algorithm::Other("rendezvous".into()), "ring"),
        ];
        for (algorithm, name) in cases {
            let router = build(&algorithm, &options, &nodes).unwrap();
            assert_eq!(router.name(), name, "wrong router for {}", algorithm);
        }
        assert!(build(&Algorithm::Ring, &options, &[]).is_none());
    }

    #[test]
    fn test_unit_position_below_one() {
        assert_eq!(unit_position(0), 0.0);
        assert!(unit_position(u64::MAX) < 1.0);
    }

    #[test]
    fn test_xxh64_seed_changes_hash() {
        assert_ne!(xxh64(b"key-1", 0), xxh64(b"key-1", 42));
        assert_eq!(xxh64(b"key-1", 42), xxh64(b"key-1", 42));
    }

    #[test]
    fn test_every_router_is_deterministic() {
        let options = RouterOptions::default();
        let nodes = nodes(4);
        let keys = keys(200);
        for algorithm in Algorithm::known() {
            let mut a = build(&algorithm, &options, &nodes).unwrap();
            let mut b = build(&algorithm, &options, &nodes).unwrap();
            assert_eq!(
                assign(a.as_mut(), &keys),
                assign(b.as_mut(), &keys),
                "{} should be deterministic",
                algorithm
            );
        }
    }

    #[test]
    fn test_every_key_assigned_in_range() {
        let options = RouterOptions::default();
        let nodes = nodes(5);
        for algorithm in Algorithm::known() {
            let mut router = build(&algorithm, &options, &nodes).unwrap();
            for slot in assign(router.as_mut(), &keys(300)) {
                let slot = slot.expect("key should be assigned");
                assert!(slot < 5, "{} picked out of range slot {}", algorithm, slot);
            }
        }
    }

    #[test]
    fn test_no_router_without_nodes() {
        assert!(build(&Algorithm::Ring, &RouterOptions::default(), &[]).is_none());
    }

    #[test]
    fn test_jump_moves_only_to_new_bucket() {
        let keys = keys(500);
        let before = assign(&mut JumpRouter::new(4), &keys);
        let after = assign(&mut JumpRouter::new(5), &keys);
        for (old, new) in before.iter().zip(&after) {
            assert!(old == new || *new == Some(4), "jump moved a key between old buckets");
        }
    }

    #[test]
    fn test_maglev_table_uses_every_node() {
        let options = RouterOptions {
            table_size: 251,
            ..RouterOptions::default()
        };
        let router = MaglevRouter::new(&nodes(3), &options);
        for node in 0..3 {
            let owned = router.table.iter().filter(|owner| **owner == node).count();
            assert!(owned > 60, "node {} owns only {} slots", node, owned);
        }
    }

    #[test]
    fn test_bounded_load_respects_capacity() {
        let options = RouterOptions {
            capacity: CapacityConfig::new(1.25, 100).unwrap(),
            ..RouterOptions::default()
        };
        let nodes = nodes(4);
        let mut router = BoundedLoadRouter::new(&nodes, &options);
        assert_eq!(router.capacity(), 32);

        let picks = assign(&mut router, &keys(100));
        let mut loads = vec![0u64; 4];
        for slot in picks.iter().flatten() {
            loads[*slot] += 1;
        }
        assert!(picks.iter().all(Option::is_some));
        assert!(loads.iter().all(|load| *load <= 32), "loads {:?}", loads);
    }

    #[test]
    fn test_bounded_load_full_ring_gives_none() {
        let options = RouterOptions {
            capacity: CapacityConfig::new(1.0, 2).unwrap(),
            ..RouterOptions::default()
        };
        let mut router = BoundedLoadRouter::new(&nodes(2), &options);
        let picks = assign(&mut router, &keys(3));
        assert_eq!(picks.iter().filter(|p| p.is_some()).count(), 2);
        assert_eq!(picks[2], None);
    }
}
