use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitter_core::{AccountId, Aggregate, AggregateId, AggregateRoot, Amount};
use splitter_events::Event;

use crate::error::LedgerError;
use crate::recipients::RecipientSet;

/// Ledger identifier (aggregate id). One per deployment or test scope.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Ledger.
///
/// Owns every account's recipient set and every account's balance. The only
/// cross-account invariant is conservation of value:
/// `held == Σ balances == total_deposited - total_withdrawn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    id: LedgerId,
    version: u64,
    recipient_limit: Option<usize>,
    recipients: HashMap<AccountId, RecipientSet>,
    balances: HashMap<AccountId, Amount>,
    held: Amount,
    total_deposited: Amount,
    total_withdrawn: Amount,
}

impl Ledger {
    /// Empty ledger, also the starting point for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            version: 0,
            recipient_limit: None,
            recipients: HashMap::new(),
            balances: HashMap::new(),
            held: Amount::ZERO,
            total_deposited: Amount::ZERO,
            total_withdrawn: Amount::ZERO,
        }
    }

    /// Cap the size of any single recipient set (`None` = unlimited).
    pub fn with_recipient_limit(mut self, limit: Option<usize>) -> Self {
        self.recipient_limit = limit;
        self
    }

    /// Rebuild a ledger by replaying its journal in order.
    ///
    /// Every event is re-validated; an inconsistent journal is rejected
    /// instead of producing a ledger that breaks conservation.
    pub fn rehydrate<'a>(
        id: LedgerId,
        events: impl IntoIterator<Item = &'a LedgerEvent>,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self::empty(id);
        for event in events {
            ledger.try_apply(event)?;
        }
        ledger.check_conservation()?;
        Ok(ledger)
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn recipient_limit(&self) -> Option<usize> {
        self.recipient_limit
    }

    /// Current balance, zero for accounts the ledger has never seen.
    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or(Amount::ZERO)
    }

    /// Total value currently in the ledger's custody.
    pub fn contract_balance(&self) -> Amount {
        self.held
    }

    pub fn is_recipient(&self, owner: &AccountId, candidate: &AccountId) -> bool {
        self.recipients
            .get(owner)
            .is_some_and(|set| set.contains(candidate))
    }

    pub fn recipient_count(&self, owner: &AccountId) -> usize {
        self.recipients.get(owner).map_or(0, RecipientSet::len)
    }

    pub fn recipients(&self, owner: &AccountId) -> &[AccountId] {
        self.recipients
            .get(owner)
            .map(RecipientSet::members)
            .unwrap_or(&[])
    }

    pub fn total_deposited(&self) -> Amount {
        self.total_deposited
    }

    pub fn total_withdrawn(&self) -> Amount {
        self.total_withdrawn
    }

    /// Every balance entry the ledger has created (including ones driven back to zero).
    pub fn balances(&self) -> impl Iterator<Item = (AccountId, Amount)> + '_ {
        self.balances.iter().map(|(account, amount)| (*account, *amount))
    }

    /// Recompute the conservation law from scratch.
    pub fn check_conservation(&self) -> Result<(), LedgerError> {
        let sum = self
            .balances()
            .try_fold(Amount::ZERO, |acc, (_, balance)| acc.checked_add(balance))?;
        if sum != self.held {
            return Err(LedgerError::conservation(format!(
                "sum of balances {sum} != held {}",
                self.held
            )));
        }

        let net = self.total_deposited.checked_sub(self.total_withdrawn)?;
        if net != self.held {
            return Err(LedgerError::conservation(format!(
                "deposited - withdrawn {net} != held {}",
                self.held
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for Ledger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterRecipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRecipient {
    pub caller: AccountId,
    pub recipient: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Split.
///
/// `amount` is the value attached to the call by the execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub caller: AccountId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Withdraw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdraw {
    pub caller: AccountId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    RegisterRecipient(RegisterRecipient),
    Split(Split),
    Withdraw(Withdraw),
}

/// Event: RecipientAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientAdded {
    pub caller: AccountId,
    pub recipient: AccountId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SplitPerformed.
///
/// Carries the recipient list as it was at split time so replay does not
/// depend on later registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPerformed {
    pub caller: AccountId,
    pub amount: Amount,
    pub share: Amount,
    pub remainder: Amount,
    pub recipients: Vec<AccountId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Withdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawn {
    pub caller: AccountId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    RecipientAdded(RecipientAdded),
    SplitPerformed(SplitPerformed),
    Withdrawn(Withdrawn),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::RecipientAdded(_) => "splitter.ledger.recipient_added",
            LedgerEvent::SplitPerformed(_) => "splitter.ledger.split_performed",
            LedgerEvent::Withdrawn(_) => "splitter.ledger.withdrawn",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::RecipientAdded(e) => e.occurred_at,
            LedgerEvent::SplitPerformed(e) => e.occurred_at,
            LedgerEvent::Withdrawn(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Ledger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        // Events from `handle` were validated against this exact state.
        if let Err(err) = self.try_apply(event) {
            tracing::error!(
                ledger_id = %self.id,
                event_type = event.event_type(),
                error = %err,
                "inconsistent ledger event ignored"
            );
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::RegisterRecipient(cmd) => self.handle_register(cmd),
            LedgerCommand::Split(cmd) => self.handle_split(cmd),
            LedgerCommand::Withdraw(cmd) => self.handle_withdraw(cmd),
        }
    }
}

/// Post-split values for every account and total the split touches.
struct SplitPlan {
    balances: HashMap<AccountId, Amount>,
    held: Amount,
    deposited: Amount,
}

struct WithdrawPlan {
    balance: Amount,
    held: Amount,
    withdrawn: Amount,
}

impl Ledger {
    fn handle_register(&self, cmd: &RegisterRecipient) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.check_new_recipient(&cmd.caller, &cmd.recipient)?;

        if let Some(limit) = self.recipient_limit {
            if self.recipient_count(&cmd.caller) >= limit {
                return Err(LedgerError::TooManyRecipients { limit });
            }
        }

        Ok(vec![LedgerEvent::RecipientAdded(RecipientAdded {
            caller: cmd.caller,
            recipient: cmd.recipient,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_split(&self, cmd: &Split) -> Result<Vec<LedgerEvent>, LedgerError> {
        let set = self
            .recipients
            .get(&cmd.caller)
            .filter(|set| !set.is_empty())
            .ok_or(LedgerError::NoRecipients)?;

        if cmd.amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }

        let n = set.len();
        if cmd.amount.units() < n as u64 {
            return Err(LedgerError::AmountTooSmall {
                amount: cmd.amount,
                recipients: n,
            });
        }

        let (share, remainder) = cmd
            .amount
            .div_rem(n as u64)
            .ok_or(LedgerError::NoRecipients)?;

        let event = SplitPerformed {
            caller: cmd.caller,
            amount: cmd.amount,
            share,
            remainder,
            recipients: set.members().to_vec(),
            occurred_at: cmd.occurred_at,
        };

        // Surfaces overflow of any credited balance before anything is emitted.
        self.plan_split(&event)?;

        Ok(vec![LedgerEvent::SplitPerformed(event)])
    }

    fn handle_withdraw(&self, cmd: &Withdraw) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.plan_withdraw(&cmd.caller, cmd.amount)?;

        Ok(vec![LedgerEvent::Withdrawn(Withdrawn {
            caller: cmd.caller,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn check_new_recipient(
        &self,
        owner: &AccountId,
        recipient: &AccountId,
    ) -> Result<(), LedgerError> {
        if !recipient.is_valid() {
            return Err(LedgerError::InvalidRecipient);
        }
        if self.is_recipient(owner, recipient) {
            return Err(LedgerError::DuplicateRecipient {
                recipient: *recipient,
            });
        }
        Ok(())
    }

    fn plan_split(&self, event: &SplitPerformed) -> Result<SplitPlan, LedgerError> {
        if event.recipients.is_empty() {
            return Err(LedgerError::NoRecipients);
        }
        if event.share.is_zero() {
            return Err(LedgerError::AmountTooSmall {
                amount: event.amount,
                recipients: event.recipients.len(),
            });
        }

        let n = event.recipients.len() as u64;
        let distributed = event.share.checked_mul(n)?.checked_add(event.remainder)?;
        if distributed != event.amount || event.remainder.units() >= n {
            return Err(LedgerError::conservation(format!(
                "split of {} into {n} shares of {} plus {} does not add up",
                event.amount, event.share, event.remainder
            )));
        }

        let mut balances = HashMap::with_capacity(event.recipients.len() + 1);
        for recipient in &event.recipients {
            self.credit_planned(&mut balances, *recipient, event.share)?;
        }
        if !event.remainder.is_zero() {
            self.credit_planned(&mut balances, event.caller, event.remainder)?;
        }

        Ok(SplitPlan {
            balances,
            held: self.held.checked_add(event.amount)?,
            deposited: self.total_deposited.checked_add(event.amount)?,
        })
    }

    fn credit_planned(
        &self,
        planned: &mut HashMap<AccountId, Amount>,
        account: AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let current = planned
            .get(&account)
            .copied()
            .unwrap_or_else(|| self.balance_of(&account));
        planned.insert(account, current.checked_add(amount)?);
        Ok(())
    }

    fn plan_withdraw(
        &self,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<WithdrawPlan, LedgerError> {
        let available = self.balance_of(caller);
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        Ok(WithdrawPlan {
            balance: available.checked_sub(amount)?,
            held: self.held.checked_sub(amount)?,
            withdrawn: self.total_withdrawn.checked_add(amount)?,
        })
    }

    /// Validate and apply one event; on error nothing is mutated.
    fn try_apply(&mut self, event: &LedgerEvent) -> Result<(), LedgerError> {
        match event {
            LedgerEvent::RecipientAdded(e) => {
                self.check_new_recipient(&e.caller, &e.recipient)?;
                self.recipients
                    .entry(e.caller)
                    .or_default()
                    .insert(e.recipient);
            }
            LedgerEvent::SplitPerformed(e) => {
                let plan = self.plan_split(e)?;
                self.balances.extend(plan.balances);
                self.held = plan.held;
                self.total_deposited = plan.deposited;
            }
            LedgerEvent::Withdrawn(e) => {
                let plan = self.plan_withdraw(&e.caller, e.amount)?;
                self.balances.insert(e.caller, plan.balance);
                self.held = plan.held;
                self.total_withdrawn = plan.withdrawn;
            }
        }

        self.version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use splitter_core::AggregateId;
    use splitter_events::execute;

    fn test_ledger() -> Ledger {
        Ledger::empty(LedgerId::new(AggregateId::new()))
    }

    fn accounts<const N: usize>() -> [AccountId; N] {
        core::array::from_fn(|_| AccountId::new())
    }

    fn register(
        ledger: &mut Ledger,
        caller: AccountId,
        recipient: AccountId,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        execute(
            ledger,
            &LedgerCommand::RegisterRecipient(RegisterRecipient {
                caller,
                recipient,
                occurred_at: Utc::now(),
            }),
        )
    }

    fn split(
        ledger: &mut Ledger,
        caller: AccountId,
        amount: u64,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        execute(
            ledger,
            &LedgerCommand::Split(Split {
                caller,
                amount: Amount::new(amount),
                occurred_at: Utc::now(),
            }),
        )
    }

    fn withdraw(
        ledger: &mut Ledger,
        caller: AccountId,
        amount: u64,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        execute(
            ledger,
            &LedgerCommand::Withdraw(Withdraw {
                caller,
                amount: Amount::new(amount),
                occurred_at: Utc::now(),
            }),
        )
    }

    fn balance(ledger: &Ledger, account: AccountId) -> u64 {
        ledger.balance_of(&account).units()
    }

    #[test]
    fn new_ledger_holds_nothing() {
        let [first] = accounts::<1>();
        let ledger = test_ledger();
        assert_eq!(ledger.contract_balance(), Amount::ZERO);
        assert_eq!(balance(&ledger, first), 0);
        assert_eq!(ledger.recipient_count(&first), 0);
        assert!(ledger.recipients(&first).is_empty());
    }

    #[test]
    fn single_recipient_receives_everything_then_withdraws_it() {
        let [owner, second] = accounts::<2>();
        let mut ledger = test_ledger();

        register(&mut ledger, owner, second).unwrap();
        split(&mut ledger, owner, 42).unwrap();

        assert_eq!(ledger.contract_balance().units(), 42);
        assert_eq!(balance(&ledger, second), 42);
        assert_eq!(balance(&ledger, owner), 0);

        withdraw(&mut ledger, second, 42).unwrap();

        assert_eq!(ledger.contract_balance().units(), 0);
        assert_eq!(balance(&ledger, second), 0);
        ledger.check_conservation().unwrap();
    }

    #[test]
    fn odd_amount_over_two_recipients_returns_remainder_to_sender() {
        let [first, second, third] = accounts::<3>();
        let mut ledger = test_ledger();

        register(&mut ledger, third, first).unwrap();
        register(&mut ledger, third, second).unwrap();
        let events = split(&mut ledger, third, 43).unwrap();

        assert_eq!(balance(&ledger, first), 21);
        assert_eq!(balance(&ledger, second), 21);
        assert_eq!(balance(&ledger, third), 1);
        match &events[..] {
            [LedgerEvent::SplitPerformed(e)] => {
                assert_eq!(e.share.units(), 21);
                assert_eq!(e.remainder.units(), 1);
                assert_eq!(e.recipients, vec![first, second]);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn even_amount_leaves_sender_balance_at_zero() {
        let [first, second, third] = accounts::<3>();
        let mut ledger = test_ledger();

        register(&mut ledger, third, first).unwrap();
        register(&mut ledger, third, second).unwrap();
        split(&mut ledger, third, 42).unwrap();

        assert_eq!(balance(&ledger, third), 0);
    }

    #[test]
    fn three_way_split_of_hundred() {
        let [first, second, third, fourth] = accounts::<4>();
        let mut ledger = test_ledger();

        for r in [first, second, third] {
            register(&mut ledger, fourth, r).unwrap();
        }
        split(&mut ledger, fourth, 100).unwrap();

        for r in [first, second, third] {
            assert_eq!(balance(&ledger, r), 33);
        }
        assert_eq!(balance(&ledger, fourth), 1);
        assert_eq!(ledger.contract_balance().units(), 100);
    }

    #[test]
    fn partial_withdraw_leaves_the_rest_in_custody() {
        let [first, second] = accounts::<2>();
        let mut ledger = test_ledger();

        register(&mut ledger, first, first).unwrap();
        register(&mut ledger, first, second).unwrap();
        split(&mut ledger, first, 42).unwrap();
        withdraw(&mut ledger, first, 21).unwrap();

        assert_eq!(ledger.contract_balance().units(), 21);
        assert_eq!(balance(&ledger, first), 0);
        assert_eq!(balance(&ledger, second), 21);
    }

    #[test]
    fn self_recipient_gets_share_and_remainder() {
        let [owner, other] = accounts::<2>();
        let mut ledger = test_ledger();

        register(&mut ledger, owner, owner).unwrap();
        register(&mut ledger, owner, other).unwrap();
        split(&mut ledger, owner, 43).unwrap();

        assert_eq!(balance(&ledger, owner), 22);
        assert_eq!(balance(&ledger, other), 21);
        ledger.check_conservation().unwrap();
    }

    #[test]
    fn split_without_recipients_is_rejected() {
        let [owner] = accounts::<1>();
        let mut ledger = test_ledger();
        let before = ledger.clone();

        assert_eq!(split(&mut ledger, owner, 42), Err(LedgerError::NoRecipients));
        assert_eq!(ledger, before);
    }

    #[test]
    fn zero_split_is_rejected() {
        let [owner, r] = accounts::<2>();
        let mut ledger = test_ledger();
        register(&mut ledger, owner, r).unwrap();

        assert_eq!(split(&mut ledger, owner, 0), Err(LedgerError::ZeroAmount));
    }

    #[test]
    fn split_smaller_than_recipient_count_is_rejected() {
        let [owner, a, b, c, d] = accounts::<5>();
        let mut ledger = test_ledger();
        for r in [a, b, c, d] {
            register(&mut ledger, owner, r).unwrap();
        }
        let before = ledger.clone();

        assert_eq!(
            split(&mut ledger, owner, 3),
            Err(LedgerError::AmountTooSmall {
                amount: Amount::new(3),
                recipients: 4
            })
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        let [owner] = accounts::<1>();
        let mut ledger = test_ledger();

        assert_eq!(
            register(&mut ledger, owner, AccountId::INVALID),
            Err(LedgerError::InvalidRecipient)
        );
        assert_eq!(ledger.recipient_count(&owner), 0);
    }

    #[test]
    fn duplicate_recipient_is_rejected_and_count_unchanged() {
        let [owner, r] = accounts::<2>();
        let mut ledger = test_ledger();
        register(&mut ledger, owner, r).unwrap();

        assert_eq!(
            register(&mut ledger, owner, r),
            Err(LedgerError::DuplicateRecipient { recipient: r })
        );
        assert_eq!(ledger.recipient_count(&owner), 1);
    }

    #[test]
    fn same_recipient_may_serve_several_senders() {
        let [a, b, r] = accounts::<3>();
        let mut ledger = test_ledger();
        register(&mut ledger, a, r).unwrap();
        register(&mut ledger, b, r).unwrap();

        assert!(ledger.is_recipient(&a, &r));
        assert!(ledger.is_recipient(&b, &r));
        assert!(!ledger.is_recipient(&r, &a));
    }

    #[test]
    fn registration_marks_and_counts_recipient() {
        let [first, second] = accounts::<2>();
        let mut ledger = test_ledger();
        let events = register(&mut ledger, first, second).unwrap();

        assert!(ledger.is_recipient(&first, &second));
        assert_eq!(ledger.recipient_count(&first), 1);
        assert_eq!(ledger.recipients(&first), &[second]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "splitter.ledger.recipient_added");
    }

    #[test]
    fn recipient_limit_is_enforced() {
        let [owner, a, b] = accounts::<3>();
        let mut ledger = test_ledger().with_recipient_limit(Some(1));
        assert_eq!(ledger.recipient_limit(), Some(1));
        register(&mut ledger, owner, a).unwrap();

        assert_eq!(
            register(&mut ledger, owner, b),
            Err(LedgerError::TooManyRecipients { limit: 1 })
        );
        assert_eq!(ledger.recipient_count(&owner), 1);
    }

    #[test]
    fn later_recipients_do_not_resplit_history() {
        let [owner, a, b] = accounts::<3>();
        let mut ledger = test_ledger();
        register(&mut ledger, owner, a).unwrap();
        split(&mut ledger, owner, 10).unwrap();
        register(&mut ledger, owner, b).unwrap();

        assert_eq!(balance(&ledger, a), 10);
        assert_eq!(balance(&ledger, b), 0);
    }

    #[test]
    fn withdraw_more_than_balance_is_rejected() {
        let [first, second] = accounts::<2>();
        let mut ledger = test_ledger();
        register(&mut ledger, first, second).unwrap();
        split(&mut ledger, first, 100).unwrap();
        let before = ledger.clone();

        assert_eq!(
            withdraw(&mut ledger, second, 150),
            Err(LedgerError::InsufficientBalance {
                requested: Amount::new(150),
                available: Amount::new(100)
            })
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn withdraw_updates_balance() {
        let [first, second] = accounts::<2>();
        let mut ledger = test_ledger();
        register(&mut ledger, first, second).unwrap();
        split(&mut ledger, first, 100).unwrap();
        withdraw(&mut ledger, second, 90).unwrap();

        assert_eq!(balance(&ledger, second), 10);
        assert_eq!(ledger.total_withdrawn().units(), 90);
    }

    #[test]
    fn overflowing_credit_is_rejected_without_mutation() {
        let [owner, r] = accounts::<2>();
        let mut ledger = test_ledger();
        register(&mut ledger, owner, r).unwrap();
        split(&mut ledger, owner, u64::MAX).unwrap();
        let before = ledger.clone();

        let err = split(&mut ledger, owner, 1).unwrap_err();
        assert!(matches!(err, LedgerError::Arithmetic(_)));
        assert_eq!(ledger, before);
    }

    #[test]
    fn version_counts_applied_events() {
        let [owner, r] = accounts::<2>();
        let mut ledger = test_ledger();
        register(&mut ledger, owner, r).unwrap();
        let _ = split(&mut ledger, owner, 0);
        split(&mut ledger, owner, 5).unwrap();

        assert_eq!(ledger.version(), 2);
    }

    #[test]
    fn rehydrate_rebuilds_identical_state() {
        let [owner, a, b] = accounts::<3>();
        let mut ledger = test_ledger();
        let mut journal = Vec::new();
        journal.extend(register(&mut ledger, owner, a).unwrap());
        journal.extend(register(&mut ledger, owner, b).unwrap());
        journal.extend(split(&mut ledger, owner, 11).unwrap());
        journal.extend(withdraw(&mut ledger, a, 3).unwrap());

        let rebuilt = Ledger::rehydrate(ledger.id_typed(), &journal).unwrap();
        assert_eq!(rebuilt, ledger);
    }

    #[test]
    fn rehydrate_rejects_withdrawal_without_funds() {
        let [a] = accounts::<1>();
        let journal = vec![LedgerEvent::Withdrawn(Withdrawn {
            caller: a,
            amount: Amount::new(1),
            occurred_at: Utc::now(),
        })];

        let err = Ledger::rehydrate(LedgerId::new(AggregateId::new()), &journal).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn rehydrate_rejects_split_that_does_not_add_up() {
        let [owner, a] = accounts::<2>();
        let journal = vec![LedgerEvent::SplitPerformed(SplitPerformed {
            caller: owner,
            amount: Amount::new(10),
            share: Amount::new(11),
            remainder: Amount::ZERO,
            recipients: vec![a],
            occurred_at: Utc::now(),
        })];

        let err = Ledger::rehydrate(LedgerId::new(AggregateId::new()), &journal).unwrap_err();
        assert!(matches!(err, LedgerError::ConservationViolated(_)));
    }

    #[test]
    fn events_round_trip_through_json() {
        let [owner, a] = accounts::<2>();
        let mut ledger = test_ledger();
        register(&mut ledger, owner, a).unwrap();
        let events = split(&mut ledger, owner, 7).unwrap();

        let json = serde_json::to_value(&events[0]).unwrap();
        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, events[0]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register(usize, usize),
        Split(usize, u64),
        Withdraw(usize, u64),
    }

    const POOL: usize = 5;

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..POOL, 0..POOL).prop_map(|(c, r)| Op::Register(c, r)),
            (0..POOL, 0u64..500).prop_map(|(c, a)| Op::Split(c, a)),
            (0..POOL, 0u64..300).prop_map(|(c, a)| Op::Withdraw(c, a)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: across any interleaving of operations, custody equals the
        /// sum of balances equals deposits minus withdrawals, and every
        /// rejected operation leaves the ledger exactly as it was.
        #[test]
        fn conservation_holds_for_any_sequence(ops in prop::collection::vec(op_strategy(), 1..60)) {
            let pool: [AccountId; POOL] = accounts();
            let mut ledger = test_ledger();
            let mut deposited: u64 = 0;
            let mut withdrawn: u64 = 0;

            for op in ops {
                let before = ledger.clone();
                let result = match op {
                    Op::Register(c, r) => register(&mut ledger, pool[c], pool[r]),
                    Op::Split(c, a) => {
                        let r = split(&mut ledger, pool[c], a);
                        if r.is_ok() { deposited += a; }
                        r
                    }
                    Op::Withdraw(c, a) => {
                        let r = withdraw(&mut ledger, pool[c], a);
                        if r.is_ok() { withdrawn += a; }
                        r
                    }
                };

                if result.is_err() {
                    prop_assert_eq!(&ledger, &before);
                }

                let sum: u64 = pool.iter().map(|a| balance(&ledger, *a)).sum();
                prop_assert_eq!(ledger.contract_balance().units(), sum);
                prop_assert_eq!(ledger.contract_balance().units(), deposited - withdrawn);
                prop_assert!(ledger.check_conservation().is_ok());
            }
        }

        /// Property: a split below the recipient count starves someone and is
        /// rejected; at or above it every recipient gains exactly floor(amount/n)
        /// and the caller gains amount mod n.
        #[test]
        fn no_zero_share_and_exact_remainder(n in 1usize..8, amount in 0u64..64) {
            let owner = AccountId::new();
            let members: Vec<AccountId> = (0..n).map(|_| AccountId::new()).collect();
            let mut ledger = test_ledger();
            for m in &members {
                register(&mut ledger, owner, *m).unwrap();
            }

            let result = split(&mut ledger, owner, amount);
            let n64 = n as u64;
            if amount == 0 {
                prop_assert_eq!(result, Err(LedgerError::ZeroAmount));
            } else if amount < n64 {
                prop_assert_eq!(result, Err(LedgerError::AmountTooSmall {
                    amount: Amount::new(amount),
                    recipients: n,
                }));
            } else {
                prop_assert!(result.is_ok());
                for m in &members {
                    prop_assert_eq!(balance(&ledger, *m), amount / n64);
                }
                prop_assert_eq!(balance(&ledger, owner), amount % n64);
            }
        }

        /// Property: withdrawing the whole balance empties it; one more unit fails.
        #[test]
        fn withdraw_bounds(amount in 1u64..10_000) {
            let [owner, r] = accounts::<2>();
            let mut ledger = test_ledger();
            register(&mut ledger, owner, r).unwrap();
            split(&mut ledger, owner, amount).unwrap();

            prop_assert!(withdraw(&mut ledger, r, amount + 1).is_err());
            prop_assert_eq!(balance(&ledger, r), amount);

            prop_assert!(withdraw(&mut ledger, r, amount).is_ok());
            prop_assert_eq!(balance(&ledger, r), 0);
        }
    }
}
