use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use splitter_core::AccountId;

/// Ordered, append-only, duplicate-free list of split recipients.
///
/// `members` keeps insertion order; `membership` answers presence checks.
/// Both are only ever mutated together through [`RecipientSet::insert`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AccountId>", into = "Vec<AccountId>")]
pub struct RecipientSet {
    members: Vec<AccountId>,
    membership: HashSet<AccountId>,
}

impl RecipientSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, account: &AccountId) -> bool {
        self.membership.contains(account)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[AccountId] {
        &self.members
    }

    /// Append `account` unless it is already present or is the invalid sentinel.
    ///
    /// Returns whether the set changed.
    pub(crate) fn insert(&mut self, account: AccountId) -> bool {
        if !account.is_valid() || self.membership.contains(&account) {
            return false;
        }
        self.membership.insert(account);
        self.members.push(account);
        true
    }
}

impl From<Vec<AccountId>> for RecipientSet {
    fn from(accounts: Vec<AccountId>) -> Self {
        let mut set = RecipientSet::new();
        for account in accounts {
            set.insert(account);
        }
        set
    }
}

impl From<RecipientSet> for Vec<AccountId> {
    fn from(set: RecipientSet) -> Self {
        set.members
    }
}
