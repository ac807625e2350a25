//! Explicit seed allocation.
//!
//! A user supplies one job seed in `[0, 2^16)` per invocation. Every unit of toy
//! work derives its own 32-bit seed from that job seed: the mixed job seed occupies
//! the high half and a unit counter the low half. Distinct job seeds therefore never
//! share unit seeds, which is what makes results from independent jobs mergeable.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Exclusive upper bound for job seeds.
pub const JOB_SEED_LIMIT: u32 = 1 << 16;

/// Maximum number of units one stream can allocate before the counter would
/// spill into a neighbouring job seed's block.
pub const MAX_UNITS_PER_STREAM: u32 = (1 << 16) - 1;

// Odd multiplier, so the mix is a bijection on 16 bits.
const SEED_MIX: u32 = 0x9e37;

// Flipped into the job seed for discovery work so it never reuses inversion seeds.
const DISCOVERY_FLIP: u16 = 0b101101;

/// User-provided job seed in `[0, 2^16)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobSeed(u16);

impl JobSeed {
    /// Validate and wrap a job seed.
    pub fn new(value: u32) -> Result<Self> {
        if value >= JOB_SEED_LIMIT {
            return Err(Error::Validation(format!(
                "seed must be in [0, {}), got {}",
                JOB_SEED_LIMIT, value
            )));
        }
        Ok(Self(value as u16))
    }

    /// Raw seed value.
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for JobSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobSeed {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let v: u32 = s
            .trim()
            .parse()
            .map_err(|e| Error::Validation(format!("invalid seed '{}': {}", s, e)))?;
        Self::new(v)
    }
}

/// Which kind of work a seed block is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStream {
    /// Hypothesis-test inversion (upper-limit scan).
    Inversion,
    /// Discovery hypothesis test.
    Discovery,
}

/// Deterministic unit-seed allocator for one (job seed, stream) pair.
#[derive(Debug, Clone)]
pub struct SeedAllocator {
    job: JobSeed,
    stream: SeedStream,
    base: u32,
}

impl SeedAllocator {
    /// Create the allocator for `job` on `stream`.
    pub fn new(job: JobSeed, stream: SeedStream) -> Self {
        let stream_seed = match stream {
            SeedStream::Inversion => job.get(),
            SeedStream::Discovery => job.get() ^ DISCOVERY_FLIP,
        };
        let mixed = (u32::from(stream_seed).wrapping_mul(SEED_MIX)) & 0xffff;
        // +1 keeps unit seeds away from zero.
        let base = (mixed << 16) + 1;
        Self { job, stream, base }
    }

    /// Job seed this allocator derives from.
    pub fn job(&self) -> JobSeed {
        self.job
    }

    /// Stream this allocator serves.
    pub fn stream(&self) -> SeedStream {
        self.stream
    }

    /// Seed for the unit at `offset` (0-based, in dispatch order).
    pub fn unit_seed(&self, offset: u32) -> Result<u32> {
        if offset >= MAX_UNITS_PER_STREAM {
            return Err(Error::Validation(format!(
                "unit offset {} exceeds the {} units available to seed {}; increase the batch size",
                offset, MAX_UNITS_PER_STREAM, self.job
            )));
        }
        Ok(self.base + offset)
    }

    /// Seeds for the first `n` units.
    pub fn unit_seeds(&self, n: usize) -> Result<Vec<u32>> {
        if n > MAX_UNITS_PER_STREAM as usize {
            return Err(Error::Validation(format!(
                "{} units requested but seed {} can only address {}; increase the batch size",
                n, self.job, MAX_UNITS_PER_STREAM
            )));
        }
        (0..n as u32).map(|i| self.unit_seed(i)).collect()
    }
}
