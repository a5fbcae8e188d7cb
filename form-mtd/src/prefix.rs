use std::{collections::HashSet, fmt, net::Ipv4Addr, str::FromStr};

use ipnet::Ipv4Net;
use rand::Rng;

use crate::error::ConfigError;

/// A single CIDR block that virtual addresses are drawn from.
///
/// The top `mask_len` bits of every generated address equal those of
/// `pattern`; the remaining bits are drawn uniformly at random.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prefix {
    pattern: Ipv4Addr,
    net: Ipv4Net,
}

impl Prefix {
    pub fn new(pattern: Ipv4Addr, mask_len: u32) -> Result<Self, ConfigError> {
        if !(1..=32).contains(&mask_len) {
            return Err(ConfigError::InvalidMaskLength {
                prefix: format!("{pattern}/{mask_len}"),
                mask: mask_len,
            });
        }
        let net = Ipv4Net::new(pattern, mask_len as u8).map_err(|_| {
            ConfigError::InvalidMaskLength {
                prefix: format!("{pattern}/{mask_len}"),
                mask: mask_len,
            }
        })?;

        Ok(Self { pattern, net })
    }

    pub fn pattern(&self) -> Ipv4Addr {
        self.pattern
    }

    pub fn mask_len(&self) -> u32 {
        self.net.prefix_len() as u32
    }

    /// The block with host bits cleared.
    pub fn network(&self) -> Ipv4Net {
        self.net.trunc()
    }

    /// Number of distinct addresses this prefix can produce.
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.mask_len())
    }

    pub fn contains(&self, addr: &Ipv4Addr) -> bool {
        self.net.contains(addr)
    }

    pub fn random_address<R: Rng + ?Sized>(&self, rng: &mut R) -> Ipv4Addr {
        if self.mask_len() == 32 {
            return self.pattern;
        }
        let netmask = u32::from(self.net.netmask());
        let fixed = u32::from(self.pattern) & netmask;
        let random = rng.gen::<u32>() & !netmask;
        Ipv4Addr::from(fixed | random)
    }
}

impl FromStr for Prefix {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.len() != 2 {
            return Err(ConfigError::MalformedPrefix(s.to_string()));
        }

        let pattern = parts[0]
            .parse::<Ipv4Addr>()
            .map_err(|_| ConfigError::MalformedPrefix(s.to_string()))?;
        let mask_len = parts[1]
            .parse::<u32>()
            .map_err(|_| ConfigError::MalformedPrefix(s.to_string()))?;

        if !(1..=32).contains(&mask_len) {
            return Err(ConfigError::InvalidMaskLength {
                prefix: s.to_string(),
                mask: mask_len,
            });
        }

        Self::new(pattern, mask_len)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pattern, self.mask_len())
    }
}

/// Weighted collection of prefixes. Each prefix is selected with
/// probability `mask_len / total_weight`.
#[derive(Clone, Debug)]
pub struct PrefixPool {
    prefixes: Vec<Prefix>,
    total_weight: u32,
}

impl PrefixPool {
    pub fn new(prefixes: Vec<Prefix>) -> Result<Self, ConfigError> {
        if prefixes.is_empty() {
            return Err(ConfigError::EmptyPrefixPool);
        }
        let total_weight = prefixes.iter().map(Prefix::mask_len).sum();

        Ok(Self { prefixes, total_weight })
    }

    /// Parse every CIDR string; a single bad entry fails the whole pool.
    pub fn from_cidrs<I, S>(cidrs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = cidrs
            .into_iter()
            .map(|cidr| cidr.as_ref().parse::<Prefix>())
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(prefixes)
    }

    pub fn prefixes(&self) -> &[Prefix] {
        &self.prefixes
    }

    pub fn total_weight(&self) -> u32 {
        self.total_weight
    }

    pub fn random_prefix<R: Rng + ?Sized>(&self, rng: &mut R) -> &Prefix {
        let mut draw = rng.gen_range(1..=self.total_weight) as i64;
        for prefix in &self.prefixes {
            draw -= prefix.mask_len() as i64;
            if draw <= 0 {
                return prefix;
            }
        }
        // draw never exceeds total_weight, so the loop always returns
        &self.prefixes[self.prefixes.len() - 1]
    }

    pub fn random_address<R: Rng + ?Sized>(&self, rng: &mut R) -> Ipv4Addr {
        self.random_prefix(rng).random_address(rng)
    }

    /// The pool's networks with overlaps merged.
    fn aggregated(&self) -> Vec<Ipv4Net> {
        let networks: Vec<Ipv4Net> = self.prefixes.iter().map(Prefix::network).collect();
        Ipv4Net::aggregate(&networks)
    }

    /// Count of distinct addresses the pool can produce that are not in
    /// `excluded`. Overlapping prefixes are counted once.
    pub fn available_addresses(&self, excluded: &HashSet<Ipv4Addr>) -> u64 {
        let aggregated = self.aggregated();

        let total: u64 = aggregated
            .iter()
            .map(|net| 1u64 << (32 - net.prefix_len() as u32))
            .sum();
        let shadowed = excluded
            .iter()
            .filter(|addr| aggregated.iter().any(|net| net.contains(*addr)))
            .count() as u64;

        total.saturating_sub(shadowed)
    }

    /// Every address the pool can produce, each exactly once.
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> {
        self.aggregated().into_iter().flat_map(|net| {
            (u32::from(net.network())..=u32::from(net.broadcast())).map(Ipv4Addr::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn top_bits(addr: Ipv4Addr, mask_len: u32) -> u32 {
        if mask_len == 0 {
            return 0;
        }
        u32::from(addr) >> (32 - mask_len)
    }

    #[test]
    fn test_parse_prefix() {
        let prefix: Prefix = "140.0.0.0/16".parse().unwrap();
        assert_eq!(prefix.pattern(), Ipv4Addr::new(140, 0, 0, 0));
        assert_eq!(prefix.mask_len(), 16);
        assert_eq!(prefix.size(), 65536);
        assert_eq!(prefix.to_string(), "140.0.0.0/16");
    }

    #[test]
    fn test_malformed_prefixes_are_rejected() {
        for bad in ["140.0.0.0", "140.0.0.0/16/2", "not-an-ip/8", "140.0.0.0/x", ""] {
            match bad.parse::<Prefix>() {
                Err(ConfigError::MalformedPrefix(s)) => assert_eq!(s, bad),
                other => panic!("expected MalformedPrefix for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_mask_length_out_of_range() {
        for bad in ["10.0.0.0/0", "10.0.0.0/33"] {
            assert!(matches!(
                bad.parse::<Prefix>(),
                Err(ConfigError::InvalidMaskLength { .. })
            ));
        }
        assert!(Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 40).is_err());
    }

    #[test]
    fn test_generated_addresses_keep_prefix_bits() {
        let mut rng = StdRng::seed_from_u64(7);
        let cidrs = ["198.51.100.0/24", "150.0.0.0/8", "10.1.2.3/1", "172.16.5.4/20", "8.8.8.8/31"];
        for cidr in cidrs {
            let prefix: Prefix = cidr.parse().unwrap();
            let m = prefix.mask_len();
            for _ in 0..1_000 {
                let addr = prefix.random_address(&mut rng);
                assert_eq!(
                    top_bits(addr, m),
                    top_bits(prefix.pattern(), m),
                    "{cidr} produced {addr}"
                );
                assert!(prefix.contains(&addr));
            }
        }
    }

    #[test]
    fn test_host_bits_cover_full_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let prefix: Prefix = "203.0.113.0/29".parse().unwrap();
        let seen: HashSet<Ipv4Addr> = (0..2_000).map(|_| prefix.random_address(&mut rng)).collect();
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn test_mask_32_always_returns_pattern() {
        let mut rng = StdRng::seed_from_u64(3);
        let prefix: Prefix = "192.0.2.77/32".parse().unwrap();
        for _ in 0..100 {
            assert_eq!(prefix.random_address(&mut rng), Ipv4Addr::new(192, 0, 2, 77));
        }
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert!(matches!(PrefixPool::new(vec![]), Err(ConfigError::EmptyPrefixPool)));
        assert!(matches!(
            PrefixPool::from_cidrs(Vec::<String>::new()),
            Err(ConfigError::EmptyPrefixPool)
        ));
    }

    #[test]
    fn test_pool_rejects_any_bad_entry() {
        let result = PrefixPool::from_cidrs(["140.0.0.0/16", "150.0.0.0"]);
        assert!(matches!(result, Err(ConfigError::MalformedPrefix(_))));
    }

    #[test]
    fn test_total_weight_is_sum_of_mask_lengths() {
        let cidrs = ["140.0.0.0/16", "150.0.0.0/8", "160.0.0.0/8", "170.0.0.0/16"];
        let pool = PrefixPool::from_cidrs(cidrs).unwrap();
        assert_eq!(pool.total_weight(), 48);
        assert_eq!(pool.prefixes().len(), 4);
    }

    #[test]
    fn test_selection_frequency_tracks_mask_length() {
        let mut rng = StdRng::seed_from_u64(42);
        let pool = PrefixPool::from_cidrs(["140.0.0.0/16", "150.0.0.0/8", "170.0.0.0/24"]).unwrap();
        let draws = 120_000;
        let mut counts = [0usize; 3];
        for _ in 0..draws {
            let chosen = pool.random_prefix(&mut rng);
            let idx = pool.prefixes().iter().position(|p| p == chosen).unwrap();
            counts[idx] += 1;
        }

        for (prefix, count) in pool.prefixes().iter().zip(counts) {
            let expected = prefix.mask_len() as f64 / pool.total_weight() as f64;
            let observed = count as f64 / draws as f64;
            assert!(
                (expected - observed).abs() < 0.01,
                "{prefix}: expected {expected:.4}, observed {observed:.4}"
            );
        }
    }

    #[test]
    fn test_pool_addresses_fall_inside_some_prefix() {
        let mut rng = StdRng::seed_from_u64(5);
        let pool = PrefixPool::from_cidrs(["140.0.0.0/16", "150.0.0.0/8"]).unwrap();
        for _ in 0..1_000 {
            let addr = pool.random_address(&mut rng);
            assert!(pool.prefixes().iter().any(|p| p.contains(&addr)));
        }
    }

    #[test]
    fn test_available_addresses_counts_overlap_once() {
        let pool = PrefixPool::from_cidrs(["10.0.0.0/30", "10.0.0.0/31", "10.0.0.8/32"]).unwrap();
        assert_eq!(pool.available_addresses(&HashSet::new()), 5);

        let excluded: HashSet<Ipv4Addr> = [Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(192, 0, 2, 1)]
            .into_iter()
            .collect();
        assert_eq!(pool.available_addresses(&excluded), 4);
    }

    #[test]
    fn test_addresses_enumerates_union_once() {
        let pool = PrefixPool::from_cidrs(["10.0.0.0/30", "10.0.0.2/31", "10.0.0.8/32"]).unwrap();
        let addresses: Vec<Ipv4Addr> = pool.addresses().collect();
        assert_eq!(
            addresses,
            vec![
                Ipv4Addr::new(10, 0, 0, 0),
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 3),
                Ipv4Addr::new(10, 0, 0, 8),
            ]
        );
        assert_eq!(addresses.len() as u64, pool.available_addresses(&HashSet::new()));
    }
}
