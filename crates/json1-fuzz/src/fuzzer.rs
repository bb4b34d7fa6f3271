use rand::{rngs::OsRng, Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Seeded source of randomness for generated documents and operations.
///
/// Uses xoshiro256** so a failing case can be replayed from its seed.
///
/// ```
/// use json1_ot_fuzz::Fuzzer;
///
/// let mut a = Fuzzer::from_u64(7);
/// let mut b = Fuzzer::from_u64(7);
/// assert_eq!(a.random_int(0, 100), b.random_int(0, 100));
/// ```
pub struct Fuzzer {
    pub seed: [u8; 32],
    rng: Xoshiro256StarStar,
}

impl Fuzzer {
    /// A fuzzer for `seed`, or for a fresh OS-provided seed.
    pub fn new(seed: Option<[u8; 32]>) -> Self {
        let seed = seed.unwrap_or_else(|| {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            bytes
        });
        Self { seed, rng: Xoshiro256StarStar::from_seed(seed) }
    }

    /// A fuzzer for a small integer seed, expanded to the full 256-bit state
    /// so nearby seeds give unrelated sequences.
    pub fn from_u64(seed: u64) -> Self {
        let mut bytes = [0u8; 32];
        Xoshiro256StarStar::seed_from_u64(seed).fill_bytes(&mut bytes);
        Self::new(Some(bytes))
    }

    /// Integer in `[min, max]`.
    pub fn random_int(&mut self, min: i64, max: i64) -> i64 {
        self.rng.gen_range(min..=max)
    }

    /// Index in `[0, len)`. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    pub fn pick<'a, T>(&mut self, elements: &'a [T]) -> &'a T {
        let idx = self.index(elements.len());
        &elements[idx]
    }

    pub fn random_bool(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability)
    }

    /// A string of `len` characters drawn from `chars`.
    pub fn random_string(&mut self, len: usize, chars: &str) -> String {
        let chars: Vec<char> = chars.chars().collect();
        (0..len).map(|_| chars[self.rng.gen_range(0..chars.len())]).collect()
    }
}
