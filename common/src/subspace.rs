//! Subspaces: fixed byte prefixes namespacing packed tuple keys.

use bytes::{BufMut, Bytes, BytesMut};

use crate::bytes::BytesRange;
use crate::tuple::{Tuple, TupleError};

/// A fixed byte prefix under which tuple-addressed keys live.
///
/// Packing a tuple through a subspace produces `prefix ∥ tuple.pack()`;
/// unpacking strips and validates the prefix before decoding the tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subspace {
    prefix: Bytes,
}

impl Subspace {
    /// Creates a subspace rooted at the given raw prefix.
    pub fn new(prefix: impl Into<Bytes>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Returns the raw prefix bytes.
    pub fn raw_prefix(&self) -> &Bytes {
        &self.prefix
    }

    /// Packs a tuple key under this subspace.
    pub fn pack(&self, tuple: &Tuple) -> Bytes {
        let packed = tuple.pack();
        let mut buf = BytesMut::with_capacity(self.prefix.len() + packed.len());
        buf.put_slice(&self.prefix);
        buf.put_slice(&packed);
        buf.freeze()
    }

    /// Strips this subspace's prefix from `key` and decodes the remainder.
    pub fn unpack(&self, key: &[u8]) -> Result<Tuple, TupleError> {
        match key.strip_prefix(self.prefix.as_ref()) {
            Some(rest) => Tuple::unpack(rest),
            None => Err(TupleError {
                message: format!(
                    "key {:02x?} does not start with subspace prefix {:02x?}",
                    key, self.prefix
                ),
            }),
        }
    }

    /// Returns whether `key` lives under this subspace.
    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Returns the child subspace for the given tuple.
    pub fn subspace(&self, tuple: &Tuple) -> Subspace {
        Subspace {
            prefix: self.pack(tuple),
        }
    }

    /// Returns the range covering every key under this subspace.
    pub fn range(&self) -> BytesRange {
        BytesRange::prefix(self.prefix.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subspace() -> Subspace {
        Subspace::new(Bytes::from_static(b"rs"))
    }

    #[test]
    fn should_pack_tuple_under_prefix() {
        // given
        let key = Tuple::new().add_str("user").add_int(7);

        // when
        let packed = subspace().pack(&key);

        // then
        assert!(packed.starts_with(b"rs"));
        assert_eq!(&packed[2..], key.pack().as_ref());
    }

    #[test]
    fn should_unpack_key_stripping_prefix() {
        // given
        let key = Tuple::new().add_str("user").add_int(7);
        let packed = subspace().pack(&key);

        // when
        let unpacked = subspace().unpack(&packed).unwrap();

        // then
        assert_eq!(unpacked, key);
    }

    #[test]
    fn should_reject_key_outside_subspace() {
        // given
        let foreign = Subspace::new(Bytes::from_static(b"xx")).pack(&Tuple::new().add_int(1));

        // when
        let result = subspace().unpack(&foreign);

        // then
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .message
                .contains("does not start with subspace prefix")
        );
    }

    #[test]
    fn should_nest_child_subspace() {
        // given
        let key = Tuple::new().add_str("user");

        // when
        let child = subspace().subspace(&key);

        // then
        assert_eq!(*child.raw_prefix(), subspace().pack(&key));
        assert!(child.contains(&child.pack(&Tuple::new().add_int(0))));
    }

    #[test]
    fn should_cover_all_child_keys_in_range() {
        // given
        let child = subspace().subspace(&Tuple::new().add_str("user"));

        // when
        let range = child.range();

        // then
        assert!(range.contains(&child.pack(&Tuple::new().add_int(-1))));
        assert!(range.contains(&child.pack(&Tuple::new().add_int(0))));
        assert!(range.contains(&child.pack(&Tuple::new().add_int(100))));
        assert!(!range.contains(&subspace().pack(&Tuple::new().add_str("usfr"))));
    }
}
