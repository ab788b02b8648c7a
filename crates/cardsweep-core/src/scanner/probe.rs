//! Per-sector key search.
//!
//! Keys are tried one at a time and the search stops at the first key the
//! card accepts. With [`KeyOrder::LastSuccessFirst`] the key that opened the
//! previous sector is tried before the rest of the table.

use super::ScanStats;
use crate::card::CardHandle;
use crate::error::{Error, Result};
use crate::keys::KeyTable;
use tracing::trace;

/// Order in which keys are probed for each sector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyOrder {
    /// Every sector walks the table from the first key
    #[default]
    TableOrder,
    /// The last key that worked goes first, then the table in order
    LastSuccessFirst,
}

/// Key search state for one scan
#[derive(Debug, Clone)]
pub(crate) struct KeyProbe {
    order: KeyOrder,
    last_success: Option<usize>,
}

impl KeyProbe {
    pub(crate) fn new(order: KeyOrder) -> Self {
        Self {
            order,
            last_success: None,
        }
    }

    /// Key indices in the order they will be tried
    fn candidates(&self, table_len: usize) -> impl Iterator<Item = usize> {
        let preferred = match self.order {
            KeyOrder::TableOrder => None,
            KeyOrder::LastSuccessFirst => self.last_success,
        };
        preferred
            .into_iter()
            .chain((0..table_len).filter(move |&index| Some(index) != preferred))
    }

    /// Find the first key that authenticates `sector`.
    ///
    /// Returns the index of that key in `keys`, or `None` if the card
    /// rejected all of them.
    pub(crate) fn find_key<H>(
        &mut self,
        card: &mut H,
        sector: usize,
        keys: &KeyTable,
        stats: &mut ScanStats,
    ) -> Result<Option<usize>>
    where
        H: CardHandle + ?Sized,
    {
        for index in self.candidates(keys.len()) {
            let Some(key) = keys.get(index) else {
                continue;
            };

            stats.auth_attempts += 1;
            let accepted = card
                .authenticate_sector_with_key_a(sector, key)
                .map_err(|e| Error::authenticate(sector, e))?;
            trace!("Sector {} key #{} ({}): {}", sector, index, key, accepted);

            if accepted {
                self.last_success = Some(index);
                return Ok(Some(index));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::mock::MockCard;
    use crate::keys::DEFAULT_KEYS;

    #[test]
    fn test_table_order_candidates() {
        let mut probe = KeyProbe::new(KeyOrder::TableOrder);
        probe.last_success = Some(2);
        assert_eq!(probe.candidates(4).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_last_success_first_candidates() {
        let mut probe = KeyProbe::new(KeyOrder::LastSuccessFirst);
        assert_eq!(probe.candidates(3).collect::<Vec<_>>(), vec![0, 1, 2]);

        probe.last_success = Some(2);
        assert_eq!(probe.candidates(4).collect::<Vec<_>>(), vec![2, 0, 1, 3]);
    }

    #[test]
    fn test_first_accepted_key_wins() {
        let keys = KeyTable::default();
        let mut card = MockCard::new(vec![vec![DEFAULT_KEYS[1], DEFAULT_KEYS[4]]]);
        let mut stats = ScanStats::default();

        let found = KeyProbe::new(KeyOrder::TableOrder)
            .find_key(&mut card, 0, &keys, &mut stats)
            .unwrap();

        assert_eq!(found, Some(1));
        assert_eq!(card.attempts_for(0), vec![DEFAULT_KEYS[0], DEFAULT_KEYS[1]]);
        assert_eq!(stats.auth_attempts, 2);
    }

    #[test]
    fn test_no_key_accepted() {
        let keys = KeyTable::default();
        let mut card = MockCard::new(vec![vec![]]);
        let mut stats = ScanStats::default();

        let found = KeyProbe::new(KeyOrder::TableOrder)
            .find_key(&mut card, 0, &keys, &mut stats)
            .unwrap();

        assert_eq!(found, None);
        assert_eq!(card.attempts_for(0).len(), keys.len());
    }

    #[test]
    fn test_transport_failure_is_communication_error() {
        let keys = KeyTable::default();
        let mut card = MockCard::new(vec![vec![DEFAULT_KEYS[0]]]);
        card.fail_auth_at_sector = Some(0);

        let err = KeyProbe::new(KeyOrder::TableOrder)
            .find_key(&mut card, 0, &keys, &mut ScanStats::default())
            .unwrap_err();

        assert!(matches!(err, Error::Authenticate { sector: 0, .. }));
    }
}
