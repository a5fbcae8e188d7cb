use std::{
    collections::{HashMap, HashSet},
    net::Ipv4Addr,
    sync::Arc,
};

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use serde::Serialize;

use crate::{error::RegenerateError, prefix::PrefixPool};

pub const DEFAULT_MAX_DRAW_ATTEMPTS: usize = 4096;

/// Addresses that are never mutated and never handed out as virtual
/// addresses (gateways, infrastructure hosts).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedSet(HashSet<Ipv4Addr>);

impl FixedSet {
    pub fn new(addresses: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self(addresses.into_iter().collect())
    }

    pub fn contains(&self, addr: &Ipv4Addr) -> bool {
        self.0.contains(addr)
    }

    pub fn as_set(&self) -> &HashSet<Ipv4Addr> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Ipv4Addr> for FixedSet {
    fn from_iter<T: IntoIterator<Item = Ipv4Addr>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// One generation of virtual -> real assignments.
///
/// Never modified after construction; a regeneration builds a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddressMapping {
    generation: u64,
    entries: HashMap<Ipv4Addr, Ipv4Addr>,
}

impl AddressMapping {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lookup(&self, virtual_addr: &Ipv4Addr) -> Option<Ipv4Addr> {
        self.entries.get(virtual_addr).copied()
    }

    pub fn contains(&self, virtual_addr: &Ipv4Addr) -> bool {
        self.entries.contains_key(virtual_addr)
    }

    /// Virtual address currently assigned to `real`, if any.
    pub fn virtual_for(&self, real: &Ipv4Addr) -> Option<Ipv4Addr> {
        self.entries
            .iter()
            .find(|(_, host)| *host == real)
            .map(|(virtual_addr, _)| *virtual_addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ipv4Addr, &Ipv4Addr)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns the current mapping and re-randomizes it on demand.
pub struct AddressMapper {
    hosts: Vec<Ipv4Addr>,
    fixed: FixedSet,
    pool: PrefixPool,
    current: Arc<AddressMapping>,
    rng: Box<dyn RngCore + Send>,
    max_draw_attempts: usize,
}

impl AddressMapper {
    /// Starts with an empty mapping; call `regenerate` before serving traffic.
    pub fn new(hosts: Vec<Ipv4Addr>, fixed: FixedSet, pool: PrefixPool) -> Self {
        let mut seen = HashSet::new();
        let hosts = hosts.into_iter().filter(|host| seen.insert(*host)).collect();

        Self {
            hosts,
            fixed,
            pool,
            current: Arc::new(AddressMapping::default()),
            rng: Box::new(StdRng::from_entropy()),
            max_draw_attempts: DEFAULT_MAX_DRAW_ATTEMPTS,
        }
    }

    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_max_draw_attempts(mut self, attempts: usize) -> Self {
        self.max_draw_attempts = attempts.max(1);
        self
    }

    pub fn hosts(&self) -> &[Ipv4Addr] {
        &self.hosts
    }

    pub fn fixed(&self) -> &FixedSet {
        &self.fixed
    }

    pub fn pool(&self) -> &PrefixPool {
        &self.pool
    }

    /// The mapping in effect right now. Later regenerations do not alter
    /// the returned instance.
    pub fn current(&self) -> Arc<AddressMapping> {
        Arc::clone(&self.current)
    }

    pub fn lookup(&self, virtual_addr: &Ipv4Addr) -> Option<Ipv4Addr> {
        self.current.lookup(virtual_addr)
    }

    pub fn is_fixed(&self, addr: &Ipv4Addr) -> bool {
        self.fixed.contains(addr)
    }

    /// Draw a fresh virtual address for every host and publish the result
    /// as a new generation. On error the current mapping is left as is.
    pub fn regenerate(&mut self) -> Result<Arc<AddressMapping>, RegenerateError> {
        let available = self.pool.available_addresses(self.fixed.as_set());
        if self.hosts.len() as u64 > available {
            return Err(RegenerateError::AddressSpaceExhausted {
                hosts: self.hosts.len(),
                available,
            });
        }

        let mut used: HashSet<Ipv4Addr> = HashSet::with_capacity(self.hosts.len());
        let mut entries = HashMap::with_capacity(self.hosts.len());
        // Built once random draws stop finding room; shrinks as hosts take slots.
        let mut free: Option<Vec<Ipv4Addr>> = None;

        for host in &self.hosts {
            let mut drawn = None;
            if free.is_none() {
                for _ in 0..self.max_draw_attempts {
                    let candidate = self.pool.random_address(&mut self.rng);
                    if self.fixed.contains(&candidate) || used.contains(&candidate) {
                        log::trace!("virtual address {candidate} unavailable, redrawing");
                        continue;
                    }
                    drawn = Some(candidate);
                    break;
                }
            }

            let virtual_addr = match drawn {
                Some(addr) => addr,
                None => {
                    let free = free.get_or_insert_with(|| {
                        log::debug!(
                            "{} draws failed for {host}, picking from the remaining free addresses",
                            self.max_draw_attempts
                        );
                        self.pool
                            .addresses()
                            .filter(|addr| !self.fixed.contains(addr) && !used.contains(addr))
                            .collect()
                    });
                    if free.is_empty() {
                        return Err(RegenerateError::DrawAttemptsExceeded {
                            host: *host,
                            attempts: self.max_draw_attempts,
                        });
                    }
                    let idx = self.rng.gen_range(0..free.len());
                    free.swap_remove(idx)
                }
            };

            used.insert(virtual_addr);
            entries.insert(virtual_addr, *host);
        }

        let mapping = Arc::new(AddressMapping {
            generation: self.current.generation + 1,
            entries,
        });
        self.current = Arc::clone(&mapping);

        log::info!("Current mapping (generation {}):", mapping.generation);
        for (virtual_addr, host) in mapping.iter() {
            log::info!("\t{virtual_addr} -> {host}");
        }

        Ok(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn hosts(n: u8) -> Vec<Ipv4Addr> {
        (1..=n).map(|i| Ipv4Addr::new(100, 0, 0, i)).collect()
    }

    fn mapper(
        hosts: Vec<Ipv4Addr>,
        fixed: &[Ipv4Addr],
        networks: &[&str],
        seed: u64,
    ) -> AddressMapper {
        let pool = PrefixPool::from_cidrs(networks).unwrap();
        AddressMapper::new(hosts, fixed.iter().copied().collect(), pool)
            .with_rng(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_starts_empty() {
        let mapper = mapper(hosts(2), &[], &["140.0.0.0/16"], 1);
        assert!(mapper.current().is_empty());
        assert_eq!(mapper.current().generation(), 0);
    }

    #[test]
    fn test_regenerate_assigns_every_host_once() {
        let mut mapper = mapper(hosts(50), &[], &["140.0.0.0/16", "150.0.0.0/8"], 2);
        let mapping = mapper.regenerate().unwrap();

        assert_eq!(mapping.len(), 50);
        let reals: HashSet<Ipv4Addr> = mapping.iter().map(|(_, real)| *real).collect();
        assert_eq!(reals, hosts(50).into_iter().collect());
        for host in hosts(50) {
            let virtual_addr = mapping.virtual_for(&host).unwrap();
            assert_eq!(mapper.lookup(&virtual_addr), Some(host));
        }
    }

    #[test]
    fn test_dense_pool_yields_distinct_virtual_addresses() {
        // 14 hosts in a /28 forces plenty of intra-pass collisions
        let mut mapper = mapper(hosts(14), &[], &["10.9.0.0/28"], 3);
        let mapping = mapper.regenerate().unwrap();
        let virtuals: HashSet<Ipv4Addr> = mapping.iter().map(|(v, _)| *v).collect();
        assert_eq!(virtuals.len(), 14);
    }

    #[test]
    fn test_fixed_addresses_never_assigned() {
        let fixed = [Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(10, 0, 0, 1)];
        for seed in 0..20 {
            let mut mapper = mapper(hosts(2), &fixed, &["10.0.0.0/30"], seed);
            let mapping = mapper.regenerate().unwrap();
            let virtuals: HashSet<Ipv4Addr> = mapping.iter().map(|(v, _)| *v).collect();
            let expected: HashSet<Ipv4Addr> =
                [Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 3)].into_iter().collect();
            assert_eq!(virtuals, expected);
        }
    }

    #[test]
    fn test_exhaustion_keeps_previous_mapping() {
        let mut mapper = mapper(hosts(4), &[], &["10.0.0.0/30"], 4);
        let first = mapper.regenerate().unwrap();

        mapper.hosts.push(Ipv4Addr::new(100, 0, 0, 99));
        let err = mapper.regenerate().unwrap_err();
        assert_eq!(err, RegenerateError::AddressSpaceExhausted { hosts: 5, available: 4 });
        assert_eq!(mapper.current(), first);
        assert_eq!(mapper.current().generation(), 1);
    }

    #[test]
    fn test_fixed_addresses_shrink_capacity() {
        let fixed = [Ipv4Addr::new(192, 0, 2, 7)];
        let mut mapper = mapper(hosts(1), &fixed, &["192.0.2.7/32"], 5);
        assert!(matches!(
            mapper.regenerate(),
            Err(RegenerateError::AddressSpaceExhausted { hosts: 1, available: 0 })
        ));
    }

    #[test]
    fn test_falls_back_to_free_addresses_when_draws_collide() {
        // a constant rng keeps drawing 10.0.0.0, so later hosts need the free list
        let pool = PrefixPool::from_cidrs(["10.0.0.0/30"]).unwrap();
        let mut mapper = AddressMapper::new(hosts(4), FixedSet::default(), pool)
            .with_rng(StepRng::new(0, 0))
            .with_max_draw_attempts(8);

        let mapping = mapper.regenerate().unwrap();
        let virtuals: HashSet<Ipv4Addr> = mapping.iter().map(|(v, _)| *v).collect();
        let expected: HashSet<Ipv4Addr> = (0..4).map(|i| Ipv4Addr::new(10, 0, 0, i)).collect();
        assert_eq!(virtuals, expected);
    }

    #[test]
    fn test_full_pool_always_maps() {
        let hosts: Vec<Ipv4Addr> = (0..4096u32).map(|i| Ipv4Addr::from(0x6400_0000 + i)).collect();
        for seed in 0..10 {
            let mut mapper = mapper(hosts.clone(), &[], &["10.0.0.0/20"], seed);
            let mapping = mapper.regenerate().unwrap();
            assert_eq!(mapping.len(), 4096);
            assert!(mapping.iter().all(|(v, _)| u32::from(*v) >> 12 == 0x0a00_0000 >> 12));
        }
    }

    #[test]
    fn test_nearly_full_pool_skips_fixed() {
        let fixed = [Ipv4Addr::new(10, 0, 0, 3), Ipv4Addr::new(10, 0, 1, 200)];
        let hosts: Vec<Ipv4Addr> = (0..510u32).map(|i| Ipv4Addr::from(0x6400_0000 + i)).collect();
        let mut mapper = mapper(hosts, &fixed, &["10.0.0.0/23"], 11);
        let mapping = mapper.regenerate().unwrap();
        assert_eq!(mapping.len(), 510);
        assert!(fixed.iter().all(|addr| !mapping.contains(addr)));
    }

    #[test]
    fn test_regenerate_publishes_new_instance() {
        let mut mapper = mapper(hosts(5), &[], &["140.0.0.0/16"], 6);
        let first = mapper.regenerate().unwrap();
        let held = mapper.current();
        let second = mapper.regenerate().unwrap();

        assert_eq!(second.generation(), 2);
        assert_eq!(held.generation(), 1);
        assert_eq!(*held, *first);
        assert!(!Arc::ptr_eq(&held, &mapper.current()));
        assert_ne!(
            first.iter().collect::<HashMap<_, _>>(),
            second.iter().collect::<HashMap<_, _>>()
        );
    }

    #[test]
    fn test_duplicate_hosts_collapse() {
        let dup = vec![Ipv4Addr::new(100, 0, 0, 7), Ipv4Addr::new(100, 0, 0, 7)];
        let mut mapper = mapper(dup, &[], &["140.0.0.0/16"], 7);
        assert_eq!(mapper.hosts().len(), 1);
        assert_eq!(mapper.regenerate().unwrap().len(), 1);
    }

    #[test]
    fn test_is_fixed() {
        let mapper = mapper(hosts(1), &[Ipv4Addr::new(172, 0, 0, 1)], &["140.0.0.0/16"], 8);
        assert!(mapper.is_fixed(&Ipv4Addr::new(172, 0, 0, 1)));
        assert!(!mapper.is_fixed(&Ipv4Addr::new(172, 0, 0, 2)));
    }
}
