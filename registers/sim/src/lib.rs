// Licensed under the Apache-2.0 license

//! Software register/memory store used to exercise generated register models
//! without hardware.

use async_trait::async_trait;
use log::debug;
use ral_runtime::bits::low_mask;
use ral_runtime::callbacks::entry_bytes;
use ral_runtime::{AsyncCallbackSet, CallbackSet, RalResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Count of every physical call made against a [`Simulator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessStats {
    pub reads: usize,
    pub writes: usize,
    pub block_reads: usize,
    pub block_writes: usize,
}

impl AccessStats {
    /// Physical read transactions, block or single.
    pub fn total_reads(&self) -> usize {
        self.reads + self.block_reads
    }

    pub fn total_writes(&self) -> usize {
        self.writes + self.block_writes
    }
}

#[derive(Default)]
struct SimState {
    store: HashMap<u64, u64>,
    overrides: HashMap<u64, u64>,
    stats: AccessStats,
}

impl SimState {
    fn load(&self, address: u64, width: u32) -> u64 {
        if let Some(value) = self.overrides.get(&address) {
            return *value & low_mask(width);
        }
        self.store.get(&address).copied().unwrap_or(0) & low_mask(width)
    }

    fn store(&mut self, address: u64, width: u32, value: u64) {
        self.store.insert(address, value & low_mask(width));
    }
}

/// Sparse word store keyed by byte address.
///
/// Each access stores or loads the whole value at its start address, so the
/// simulator matches the register model as long as accesses to one location
/// always use the same width.
pub struct Simulator {
    state: Mutex<SimState>,
    block: AtomicBool,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            block: AtomicBool::new(true),
        }
    }

    /// Simulator that only offers the single read/write callbacks.
    pub fn without_block_access() -> Self {
        let sim = Self::new();
        sim.set_block_access(false);
        sim
    }

    pub fn set_block_access(&self, enabled: bool) {
        self.block.store(enabled, Ordering::Relaxed);
    }

    pub fn block_access(&self) -> bool {
        self.block.load(Ordering::Relaxed)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets a location without counting it as an access.
    pub fn preload(&self, address: u64, value: u64) {
        self.state().store.insert(address, value);
    }

    /// Loads a batch of reset values, typically generated from a register map.
    pub fn preload_all(&self, values: &[(u64, u64)]) {
        let mut state = self.state();
        for (address, value) in values {
            state.store.insert(*address, *value);
        }
    }

    /// Current content of a location without counting it as an access.
    pub fn peek(&self, address: u64) -> u64 {
        self.state().store.get(&address).copied().unwrap_or(0)
    }

    /// Makes every read of `address` return `value` regardless of what was
    /// written, until [`Simulator::clear_read_override`].
    pub fn override_read(&self, address: u64, value: u64) {
        self.state().overrides.insert(address, value);
    }

    pub fn clear_read_override(&self, address: u64) {
        self.state().overrides.remove(&address);
    }

    pub fn stats(&self) -> AccessStats {
        self.state().stats
    }

    pub fn reset_stats(&self) {
        self.state().stats = AccessStats::default();
    }

    /// Clears contents, overrides and statistics.
    pub fn clear(&self) {
        *self.state() = SimState::default();
    }

    fn do_read(&self, address: u64, width: u32) -> u64 {
        let mut state = self.state();
        state.stats.reads += 1;
        let value = state.load(address, width);
        debug!("sim read {:#x} -> {:#x}", address, value);
        value
    }

    fn do_write(&self, address: u64, width: u32, data: u64) {
        let mut state = self.state();
        state.stats.writes += 1;
        debug!("sim write {:#x} <- {:#x}", address, data);
        state.store(address, width, data);
    }

    fn do_read_block(&self, address: u64, width: u32, length: usize) -> Vec<u64> {
        let mut state = self.state();
        state.stats.block_reads += 1;
        debug!("sim block read {:#x} x{}", address, length);
        let step = entry_bytes(width);
        (0..length as u64)
            .map(|i| state.load(address + i * step, width))
            .collect()
    }

    fn do_write_block(&self, address: u64, width: u32, data: &[u64]) {
        let mut state = self.state();
        state.stats.block_writes += 1;
        debug!("sim block write {:#x} x{}", address, data.len());
        let step = entry_bytes(width);
        for (i, value) in data.iter().enumerate() {
            state.store(address + i as u64 * step, width, *value);
        }
    }
}

impl CallbackSet for Simulator {
    fn read(&self, address: u64, width: u32, _accesswidth: u32) -> RalResult<u64> {
        Ok(self.do_read(address, width))
    }

    fn write(&self, address: u64, width: u32, _accesswidth: u32, data: u64) -> RalResult<()> {
        self.do_write(address, width, data);
        Ok(())
    }

    fn read_block(
        &self,
        address: u64,
        width: u32,
        _accesswidth: u32,
        length: usize,
    ) -> RalResult<Vec<u64>> {
        Ok(self.do_read_block(address, width, length))
    }

    fn write_block(
        &self,
        address: u64,
        width: u32,
        _accesswidth: u32,
        data: &[u64],
    ) -> RalResult<()> {
        self.do_write_block(address, width, data);
        Ok(())
    }

    fn supports_block_read(&self) -> bool {
        self.block_access()
    }

    fn supports_block_write(&self) -> bool {
        self.block_access()
    }
}

#[async_trait]
impl AsyncCallbackSet for Simulator {
    async fn read(&self, address: u64, width: u32, _accesswidth: u32) -> RalResult<u64> {
        Ok(self.do_read(address, width))
    }

    async fn write(&self, address: u64, width: u32, _accesswidth: u32, data: u64) -> RalResult<()> {
        self.do_write(address, width, data);
        Ok(())
    }

    async fn read_block(
        &self,
        address: u64,
        width: u32,
        _accesswidth: u32,
        length: usize,
    ) -> RalResult<Vec<u64>> {
        Ok(self.do_read_block(address, width, length))
    }

    async fn write_block(
        &self,
        address: u64,
        width: u32,
        _accesswidth: u32,
        data: &[u64],
    ) -> RalResult<()> {
        self.do_write_block(address, width, data);
        Ok(())
    }

    fn supports_block_read(&self) -> bool {
        self.block_access()
    }

    fn supports_block_write(&self) -> bool {
        self.block_access()
    }
}
