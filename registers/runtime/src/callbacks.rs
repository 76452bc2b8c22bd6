// Licensed under the Apache-2.0 license

//! Hardware access callbacks consumed by the register objects.

use crate::bits::{join_words, split_words, MAX_VALUE_WIDTH, MAX_WORD_WIDTH};
use crate::error::{RalError, RalResult};
use log::trace;

/// The four physical access primitives behind a register model.
///
/// Only the single read/write are expected from every implementation; the
/// block variants are optional and advertised through `supports_block_read`
/// and `supports_block_write`. Widths are in bits, addresses in bytes.
pub trait CallbackSet: Send + Sync {
    fn read(&self, address: u64, width: u32, accesswidth: u32) -> RalResult<u64> {
        let _ = (width, accesswidth);
        Err(RalError::MissingCallback {
            operation: "read",
            address,
        })
    }

    fn write(&self, address: u64, width: u32, accesswidth: u32, data: u64) -> RalResult<()> {
        let _ = (width, accesswidth, data);
        Err(RalError::MissingCallback {
            operation: "write",
            address,
        })
    }

    fn read_block(
        &self,
        address: u64,
        width: u32,
        accesswidth: u32,
        length: usize,
    ) -> RalResult<Vec<u64>> {
        let _ = (width, accesswidth, length);
        Err(RalError::MissingCallback {
            operation: "block read",
            address,
        })
    }

    fn write_block(
        &self,
        address: u64,
        width: u32,
        accesswidth: u32,
        data: &[u64],
    ) -> RalResult<()> {
        let _ = (width, accesswidth, data);
        Err(RalError::MissingCallback {
            operation: "block write",
            address,
        })
    }

    fn supports_block_read(&self) -> bool {
        false
    }

    fn supports_block_write(&self) -> bool {
        false
    }
}

/// Bytes occupied by one entry of `width` bits: the width rounded up to a
/// power-of-two number of bytes.
pub fn entry_bytes(width: u32) -> u64 {
    u64::from(width.div_ceil(8)).next_power_of_two()
}

/// A run of equally sized entries starting at `address`, `stride` bytes apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockTransfer {
    pub address: u64,
    pub width: u32,
    pub accesswidth: u32,
    pub entries: usize,
    pub stride: u64,
}

impl BlockTransfer {
    pub fn contiguous(address: u64, width: u32, accesswidth: u32, entries: usize) -> Self {
        Self {
            address,
            width,
            accesswidth,
            entries,
            stride: entry_bytes(width),
        }
    }

    /// Entries can only go through a block primitive when they are packed
    /// back to back.
    pub fn is_contiguous(&self) -> bool {
        self.stride == entry_bytes(self.width)
    }

    pub fn entry_address(&self, index: usize) -> u64 {
        self.address + index as u64 * self.stride
    }

    pub fn read(&self, callbacks: &dyn CallbackSet) -> RalResult<Vec<u64>> {
        if self.entries == 0 {
            return Ok(Vec::new());
        }
        if callbacks.supports_block_read() && self.is_contiguous() {
            trace!(
                "block read {:#x} x{} ({} bits)",
                self.address,
                self.entries,
                self.width
            );
            let data =
                callbacks.read_block(self.address, self.width, self.accesswidth, self.entries)?;
            if data.len() != self.entries {
                return Err(RalError::LengthMismatch {
                    expected: self.entries,
                    actual: data.len(),
                });
            }
            return Ok(data);
        }
        (0..self.entries)
            .map(|i| {
                let address = self.entry_address(i);
                trace!("read {:#x} ({} bits)", address, self.width);
                callbacks.read(address, self.width, self.accesswidth)
            })
            .collect()
    }

    pub fn write(&self, callbacks: &dyn CallbackSet, data: &[u64]) -> RalResult<()> {
        if data.len() != self.entries {
            return Err(RalError::LengthMismatch {
                expected: self.entries,
                actual: data.len(),
            });
        }
        if data.is_empty() {
            return Ok(());
        }
        if callbacks.supports_block_write() && self.is_contiguous() {
            trace!(
                "block write {:#x} x{} ({} bits)",
                self.address,
                self.entries,
                self.width
            );
            return callbacks.write_block(self.address, self.width, self.accesswidth, data);
        }
        for (i, value) in data.iter().enumerate() {
            let address = self.entry_address(i);
            trace!("write {:#x} <- {:#x} ({} bits)", address, value, self.width);
            callbacks.write(address, self.width, self.accesswidth, *value)?;
        }
        Ok(())
    }
}

impl BlockTransfer {
    /// Access-width words per entry; entries wider than the access width are
    /// moved as consecutive sub-words.
    pub fn words_per_entry(&self) -> usize {
        if self.width > self.accesswidth {
            (self.width / self.accesswidth) as usize
        } else {
            1
        }
    }

    /// The word-level transfers that move these entries. Wide entries whose
    /// sub-words tile the stride exactly become one run of sub-words so they
    /// can still go through a single block primitive; otherwise each entry
    /// gets its own run.
    pub fn word_transfers(&self) -> Vec<BlockTransfer> {
        let words = self.words_per_entry();
        if words == 1 {
            return vec![*self];
        }
        let run = |address, count| {
            BlockTransfer::contiguous(address, self.accesswidth, self.accesswidth, count)
        };
        if self.stride == words as u64 * entry_bytes(self.accesswidth) {
            return vec![run(self.address, self.entries * words)];
        }
        (0..self.entries)
            .map(|i| run(self.entry_address(i), words))
            .collect()
    }

    pub(crate) fn join_entries(&self, words: &[u64]) -> Vec<u128> {
        match self.words_per_entry() {
            1 => words.iter().map(|w| u128::from(*w)).collect(),
            n => words
                .chunks(n)
                .map(|chunk| join_words(chunk, self.accesswidth))
                .collect(),
        }
    }

    pub(crate) fn split_entries(&self, values: &[u128]) -> RalResult<Vec<u64>> {
        if values.len() != self.entries {
            return Err(RalError::LengthMismatch {
                expected: self.entries,
                actual: values.len(),
            });
        }
        match self.words_per_entry() {
            1 => values
                .iter()
                .map(|v| {
                    u64::try_from(*v).map_err(|_| RalError::TooLarge {
                        value: *v,
                        max: u128::from(u64::MAX),
                    })
                })
                .collect(),
            _ => Ok(values
                .iter()
                .flat_map(|v| split_words(*v, self.width, self.accesswidth))
                .collect()),
        }
    }

    pub(crate) fn check_widths(&self) -> RalResult<()> {
        if self.width > MAX_VALUE_WIDTH {
            return Err(RalError::TooWide {
                kind: "entry",
                width: self.width,
                max: MAX_VALUE_WIDTH,
            });
        }
        if self.accesswidth > MAX_WORD_WIDTH {
            return Err(RalError::TooWide {
                kind: "access",
                width: self.accesswidth,
                max: MAX_WORD_WIDTH,
            });
        }
        Ok(())
    }

    /// Reads every entry as a whole value.
    pub fn read_values(&self, callbacks: &dyn CallbackSet) -> RalResult<Vec<u128>> {
        self.check_widths()?;
        let mut words = Vec::with_capacity(self.entries * self.words_per_entry());
        for transfer in self.word_transfers() {
            words.extend(transfer.read(callbacks)?);
        }
        Ok(self.join_entries(&words))
    }

    pub fn write_values(&self, callbacks: &dyn CallbackSet, values: &[u128]) -> RalResult<()> {
        self.check_widths()?;
        let words = self.split_entries(values)?;
        let mut rest = words.as_slice();
        for transfer in self.word_transfers() {
            let (head, tail) = rest.split_at(transfer.entries);
            transfer.write(callbacks, head)?;
            rest = tail;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockCallbacks;
    use super::*;

    struct NoCallbacks;
    impl CallbackSet for NoCallbacks {}

    #[test]
    fn test_missing_callbacks() {
        let cb = NoCallbacks;
        assert_eq!(
            cb.read(0x10, 32, 32),
            Err(RalError::MissingCallback {
                operation: "read",
                address: 0x10
            })
        );
        assert!(cb.write(0x10, 32, 32, 0).is_err());
        let transfer = BlockTransfer::contiguous(0x100, 32, 32, 2);
        assert!(matches!(
            transfer.read(&cb),
            Err(RalError::MissingCallback {
                operation: "read",
                ..
            })
        ));
    }

    #[test]
    fn test_block_fallback_equivalence() {
        let block = MockCallbacks::new(true);
        let single = MockCallbacks::new(false);
        for (i, v) in [10, 11, 12, 13].into_iter().enumerate() {
            block.set(0x100 + 4 * i as u64, v);
            single.set(0x100 + 4 * i as u64, v);
        }
        let transfer = BlockTransfer::contiguous(0x100, 32, 32, 4);

        assert_eq!(transfer.read(&block).unwrap(), vec![10, 11, 12, 13]);
        assert_eq!(block.block_reads.lock().unwrap().len(), 1);
        assert!(block.reads.lock().unwrap().is_empty());

        assert_eq!(transfer.read(&single).unwrap(), vec![10, 11, 12, 13]);
        assert_eq!(
            *single.reads.lock().unwrap(),
            vec![0x100, 0x104, 0x108, 0x10c]
        );
    }

    #[test]
    fn test_strided_entries_use_single_access() {
        let cb = MockCallbacks::new(true);
        let transfer = BlockTransfer {
            address: 0x0,
            width: 32,
            accesswidth: 32,
            entries: 3,
            stride: 0x10,
        };
        assert!(!transfer.is_contiguous());
        transfer.write(&cb, &[1, 2, 3]).unwrap();
        assert!(cb.block_writes.lock().unwrap().is_empty());
        assert_eq!(
            *cb.writes.lock().unwrap(),
            vec![(0x0, 1), (0x10, 2), (0x20, 3)]
        );
    }

    #[test]
    fn test_entry_bytes() {
        assert_eq!(entry_bytes(8), 1);
        assert_eq!(entry_bytes(16), 2);
        assert_eq!(entry_bytes(24), 4);
        assert_eq!(entry_bytes(32), 4);
        assert_eq!(entry_bytes(64), 8);
        assert!(BlockTransfer::contiguous(0, 24, 24, 4).is_contiguous());
    }

    #[test]
    fn test_write_length_mismatch() {
        let cb = MockCallbacks::new(true);
        let transfer = BlockTransfer::contiguous(0x0, 8, 8, 2);
        assert_eq!(
            transfer.write(&cb, &[1]),
            Err(RalError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(cb.write_count(), 0);
    }

    #[test]
    fn test_wide_entries_as_sub_words() {
        let value = |i: u128| (i << 96) | i;
        let values: Vec<u128> = (1..=3).map(value).collect();

        let block = MockCallbacks::new(true);
        let packed = BlockTransfer::contiguous(0x100, 128, 32, 3);
        assert_eq!(packed.words_per_entry(), 4);
        packed.write_values(&block, &values).unwrap();
        assert_eq!(
            *block.block_writes.lock().unwrap(),
            vec![(0x100, vec![1, 0, 0, 1, 2, 0, 0, 2, 3, 0, 0, 3])]
        );
        assert_eq!(block.get(0x11c), 2);
        assert_eq!(packed.read_values(&block).unwrap(), values);
        assert_eq!(*block.block_reads.lock().unwrap(), vec![(0x100, 12)]);

        let spread = MockCallbacks::new(true);
        let strided = BlockTransfer {
            stride: 0x20,
            ..packed
        };
        assert_eq!(strided.word_transfers().len(), 3);
        strided.write_values(&spread, &values).unwrap();
        assert_eq!(spread.get(0x120), 2);
        assert_eq!(spread.get(0x12c), 2);
        assert_eq!(strided.read_values(&spread).unwrap(), values);

        assert!(matches!(
            packed.write_values(&block, &values[..2]),
            Err(RalError::LengthMismatch { .. })
        ));
        let narrow = BlockTransfer::contiguous(0x0, 32, 32, 1);
        assert!(matches!(
            narrow.write_values(&block, &[1 << 64]),
            Err(RalError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_sub_words_leaving_gaps() {
        // 96 bit entries sit 16 bytes apart but only fill 12
        let mock = MockCallbacks::new(true);
        let transfer = BlockTransfer::contiguous(0x0, 96, 32, 2);
        let runs = transfer.word_transfers();
        assert_eq!(runs.len(), 2);
        assert_eq!((runs[1].address, runs[1].entries), (0x10, 3));
        transfer.write_values(&mock, &[7 << 64, 9]).unwrap();
        assert_eq!(mock.get(0x8), 7);
        assert_eq!(mock.get(0x10), 9);
        assert_eq!(transfer.read_values(&mock).unwrap(), vec![7 << 64, 9]);
    }

    #[test]
    fn test_rejects_unsupported_widths() {
        let mock = MockCallbacks::new(false);
        assert_eq!(
            BlockTransfer::contiguous(0x0, 256, 64, 1).read_values(&mock),
            Err(RalError::TooWide {
                kind: "entry",
                width: 256,
                max: 128
            })
        );
        assert_eq!(
            BlockTransfer::contiguous(0x0, 128, 128, 1).write_values(&mock, &[0]),
            Err(RalError::TooWide {
                kind: "access",
                width: 128,
                max: 64
            })
        );
        assert!(mock.writes.lock().unwrap().is_empty());
    }
}
