//! The set of recipients of one envelope.

use crate::artifacts::KeyId;
use crate::keys::PublicKey;

use alloc::vec::Vec;

/// Recipients for a single encryption.
///
/// Entries are kept in insertion order and end up in the header in that order. Identifiers are
/// not checked for duplicates: a decryptor picks the first entry with its identifier, so a
/// duplicate identifier for a different key makes the envelope unreadable for that key.
#[derive(Debug, Clone, Default)]
pub struct RecipientSet {
    entries: Vec<(KeyId, PublicKey)>,
}

impl RecipientSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a recipient under the given identifier.
    pub fn add_key_recipient(&mut self, id: KeyId, public_key: PublicKey) {
        self.entries.push((id, public_key));
    }

    /// Adds a recipient under the identifier of its key.
    pub fn add_public_key(&mut self, public_key: &PublicKey) {
        self.add_key_recipient(public_key.id().clone(), public_key.clone());
    }

    /// The number of recipients.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the recipients in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&KeyId, &PublicKey)> + '_ {
        self.entries.iter().map(|(id, pk)| (id, pk))
    }
}

impl From<&[PublicKey]> for RecipientSet {
    fn from(keys: &[PublicKey]) -> Self {
        let mut set = Self::new();
        for pk in keys {
            set.add_public_key(pk);
        }

        set
    }
}

impl Extend<(KeyId, PublicKey)> for RecipientSet {
    fn extend<T: IntoIterator<Item = (KeyId, PublicKey)>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestSetup;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_order_and_duplicates() {
        let mut rng = StdRng::seed_from_u64(10);
        let setup = TestSetup::new(&mut rng);

        let a = &setup.recipients[0].public_key;
        let b = &setup.recipients[1].public_key;

        let mut set = RecipientSet::new();
        assert!(set.is_empty());

        set.add_public_key(b);
        set.add_key_recipient(a.id().clone(), a.clone());
        set.add_key_recipient(a.id().clone(), b.clone());

        assert_eq!(set.len(), 3);
        let ids: Vec<&KeyId> = set.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![b.id(), a.id(), a.id()]);
    }

    #[test]
    fn test_from_keys() {
        let mut rng = StdRng::seed_from_u64(11);
        let setup = TestSetup::new(&mut rng);

        let keys: Vec<PublicKey> = setup
            .recipients
            .iter()
            .map(|kp| kp.public_key.clone())
            .collect();
        let set = RecipientSet::from(&keys[..]);

        assert_eq!(set.len(), keys.len());
        for ((id, pk), key) in set.iter().zip(keys.iter()) {
            assert_eq!(id, key.id());
            assert_eq!(pk.id(), key.id());
        }
    }
}
