use std::hash::Hasher;

/// FNV-1a over the bytes of a (master seed, weather name, trial index)
/// triple. The result must not depend on the process, so the std
/// `RandomState` hashers cannot be used for seeding trials.
#[derive(Debug)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

/// Seed for one trial: stable across runs, platforms and thread scheduling.
pub fn trial_seed(master_seed: u64, scenario: &str, trial_index: u64) -> u64 {
    let mut hasher = FnvHasher::new();
    hasher.write_u64(master_seed);
    hasher.write(scenario.as_bytes());
    hasher.write_u64(trial_index);
    hasher.finish()
}
