//! Size accounting for stored records.

/// Accumulator for key-value sizes while loading or saving records.
///
/// The counters describe durable bytes: the non-durable offset tail of an
/// incomplete version value is excluded from `value_size`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeInfo {
    /// Number of entries the record occupies.
    pub key_count: u32,
    /// Total key bytes across the record's entries.
    pub key_size: u64,
    /// Total value bytes across the record's entries.
    pub value_size: u64,
    /// Whether the record is stored as split chunks.
    pub split: bool,
    /// Whether a version entry is stored with the record.
    pub versioned_inline: bool,
}

impl SizeInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the counters to describe a single entry.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.key_count = 1;
        self.key_size = key.len() as u64;
        self.value_size = value.len() as u64;
    }

    /// Accumulates one more entry into the counters.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        self.key_count += 1;
        self.key_size += key.len() as u64;
        self.value_size += value.len() as u64;
    }

    /// Accumulates another record's counters into this one. The layout flags
    /// are left untouched.
    pub fn add_sizes(&mut self, sizes: &SizeInfo) {
        self.key_count += sizes.key_count;
        self.key_size += sizes.key_size;
        self.value_size += sizes.value_size;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_set_counters_from_single_entry() {
        // given
        let mut sizes = SizeInfo::new();
        sizes.add(b"leftover", b"junk");

        // when
        sizes.set(b"key", b"value");

        // then
        assert_eq!(sizes.key_count, 1);
        assert_eq!(sizes.key_size, 3);
        assert_eq!(sizes.value_size, 5);
    }

    #[test]
    fn should_accumulate_entries() {
        // given
        let mut sizes = SizeInfo::new();
        sizes.set(b"key", b"value");

        // when
        sizes.add(b"key2", b"value2");

        // then
        assert_eq!(sizes.key_count, 2);
        assert_eq!(sizes.key_size, 7);
        assert_eq!(sizes.value_size, 11);
    }

    #[test]
    fn should_accumulate_another_size_info() {
        // given
        let mut total = SizeInfo::new();
        total.set(b"key", b"value");
        total.split = true;
        let mut other = SizeInfo::new();
        other.set(b"key2", b"value2");
        other.add(b"key33", b"value33");
        other.versioned_inline = true;

        // when
        total.add_sizes(&other);

        // then - counters combine, flags stay as they were
        assert_eq!(total.key_count, 3);
        assert_eq!(total.key_size, 3 + 4 + 5);
        assert_eq!(total.value_size, 5 + 6 + 7);
        assert!(total.split);
        assert!(!total.versioned_inline);
    }

    #[test]
    fn should_reset_flags_and_counters() {
        // given
        let mut sizes = SizeInfo::new();
        sizes.set(b"key", b"value");
        sizes.split = true;
        sizes.versioned_inline = true;

        // when
        sizes.reset();

        // then
        assert_eq!(sizes, SizeInfo::default());
    }
}
