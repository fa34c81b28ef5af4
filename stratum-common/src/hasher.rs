// Copyright 2025 stratum Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use twox_hash::XxHash64;

/// Hash a string key with xxHash64.
pub fn hash_key(key: &str) -> u64 {
    XxHash64::oneshot(0, key.as_bytes())
}

/// Maps keys onto a power-of-two number of shards.
#[derive(Debug, Clone, Copy)]
pub struct ShardMask {
    mask: u64,
}

impl ShardMask {
    /// Create a mask for `shards` shards.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is not a power of two.
    pub fn new(shards: usize) -> Self {
        assert!(shards.is_power_of_two(), "shards must be a power of two, given: {shards}");
        Self {
            mask: shards as u64 - 1,
        }
    }

    /// Index of the shard that owns `key`.
    pub fn shard(&self, key: &str) -> usize {
        (hash_key(key) & self.mask) as usize
    }

    /// Shard count.
    pub fn shards(&self) -> usize {
        self.mask as usize + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_mask() {
        let mask = ShardMask::new(16);
        assert_eq!(mask.shards(), 16);
        for i in 0..1000 {
            let key = format!("key-{i}");
            let shard = mask.shard(&key);
            assert!(shard < 16);
            assert_eq!(shard, mask.shard(&key));
        }

        let single = ShardMask::new(1);
        assert_eq!(single.shard("anything"), 0);
    }

    #[test]
    #[should_panic]
    fn test_shard_mask_not_power_of_two() {
        ShardMask::new(12);
    }
}
