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

//! An in-memory LRU cache with TTLs, shared by many threads.
//!
//! Reads and writes go straight to sharded hash maps. The recency list and the size accounting belong to a single
//! worker thread, fed through bounded channels, so readers never contend on a global list lock. Two flavors share
//! that machinery:
//!
//! - [`Cache`] maps a string key to a value.
//! - [`LayeredCache`] maps a `(primary, secondary)` key pair to a value and can drop every entry of a primary key
//!   at once.

mod bucket;
mod cache;
mod config;
mod error;
mod item;
mod layered;
mod layered_bucket;
mod prelude;
mod worker;

pub use prelude::*;
