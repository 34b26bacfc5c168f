//! Serialized command execution for one ledger instance.
//!
//! Every mutating call runs the whole pipeline under a single write lock:
//!
//! ```text
//! CallContext + request
//!   ↓
//! 1. Decide (Ledger::handle, no mutation)
//!   ↓
//! 2. Stage journal entries (optimistic version check)
//!   ↓
//! 3. Payout (withdraw only; failure aborts with nothing applied)
//!   ↓
//! 4. Commit journal entries + apply events to the ledger
//!   ↓
//! 5. Publish notifications, then release the lock
//! ```
//!
//! Subscribers therefore see notifications in journal order. Queries take the
//! read lock, so they never observe a half-applied call.

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use chrono::Utc;
use thiserror::Error;

use splitter_core::{AccountId, Aggregate, AggregateRoot, Amount, ExpectedVersion};
use splitter_events::{EventBus, EventEnvelope};
use splitter_ledger::{
    Ledger, LedgerCommand, LedgerError, LedgerEvent, LedgerId, RegisterRecipient, Split, Withdraw,
};

use crate::config::LedgerConfig;
use crate::journal::{Journal, JournalError, LedgerEnvelope};
use crate::payout::{Payout, PayoutError};

/// Identity and attached value supplied by the execution environment.
///
/// The service trusts `caller` completely. `value` is the amount moved into
/// custody with the call; only `split` accepts a non-zero value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub caller: AccountId,
    pub value: Amount,
}

impl CallContext {
    pub fn new(caller: AccountId) -> Self {
        Self {
            caller,
            value: Amount::ZERO,
        }
    }

    pub fn with_value(caller: AccountId, value: Amount) -> Self {
        Self { caller, value }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("payout failed: {0}")]
    Payout(#[from] PayoutError),

    #[error("call does not accept value, but {0} was attached")]
    UnexpectedValue(Amount),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("ledger state lock poisoned")]
    Poisoned,

    #[error("journal replay failed: {0}")]
    Replay(String),
}

#[derive(Debug)]
struct State {
    ledger: Ledger,
    journal: Journal,
}

/// One ledger deployment: state, journal, payout rail and notification bus.
#[derive(Debug)]
pub struct LedgerService<P, B> {
    state: RwLock<State>,
    payout: P,
    bus: B,
    config: LedgerConfig,
}

impl<P, B> LedgerService<P, B>
where
    P: Payout,
    B: EventBus<LedgerEnvelope>,
{
    pub fn new(id: LedgerId, config: LedgerConfig, payout: P, bus: B) -> Self {
        let ledger = Ledger::empty(id).with_recipient_limit(config.max_recipients);
        Self {
            state: RwLock::new(State {
                ledger,
                journal: Journal::new(id),
            }),
            payout,
            bus,
            config,
        }
    }

    /// Rebuild a service from a previously exported journal.
    ///
    /// Nothing is paid out or published during replay.
    pub fn restore(
        journal: Journal,
        config: LedgerConfig,
        payout: P,
        bus: B,
    ) -> Result<Self, ServiceError> {
        journal.validate()?;
        let ledger = Ledger::rehydrate(journal.ledger_id(), journal.events())
            .map_err(|e| ServiceError::Replay(e.to_string()))?
            .with_recipient_limit(config.max_recipients);

        tracing::info!(
            ledger_id = %journal.ledger_id(),
            events = journal.len(),
            held = %ledger.contract_balance(),
            "ledger restored from journal"
        );

        Ok(Self {
            state: RwLock::new(State { ledger, journal }),
            payout,
            bus,
            config,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn payout(&self) -> &P {
        &self.payout
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn register_recipient(
        &self,
        ctx: CallContext,
        recipient: AccountId,
    ) -> Result<Vec<LedgerEnvelope>, ServiceError> {
        reject_value(&ctx)?;
        let command = LedgerCommand::RegisterRecipient(RegisterRecipient {
            caller: ctx.caller,
            recipient,
            occurred_at: Utc::now(),
        });
        self.dispatch(ctx.caller, command, None)
    }

    /// Deposit `ctx.value` and divide it among the caller's recipients.
    pub fn split(&self, ctx: CallContext) -> Result<Vec<LedgerEnvelope>, ServiceError> {
        let command = LedgerCommand::Split(Split {
            caller: ctx.caller,
            amount: ctx.value,
            occurred_at: Utc::now(),
        });
        self.dispatch(ctx.caller, command, None)
    }

    /// Debit `amount` from the caller and pay it out.
    pub fn withdraw(
        &self,
        ctx: CallContext,
        amount: Amount,
    ) -> Result<Vec<LedgerEnvelope>, ServiceError> {
        reject_value(&ctx)?;
        let command = LedgerCommand::Withdraw(Withdraw {
            caller: ctx.caller,
            amount,
            occurred_at: Utc::now(),
        });
        self.dispatch(ctx.caller, command, Some(amount))
    }

    pub fn balance_of(&self, account: &AccountId) -> Amount {
        self.read().ledger.balance_of(account)
    }

    pub fn contract_balance(&self) -> Amount {
        self.read().ledger.contract_balance()
    }

    pub fn is_recipient(&self, owner: &AccountId, candidate: &AccountId) -> bool {
        self.read().ledger.is_recipient(owner, candidate)
    }

    pub fn recipient_count(&self, owner: &AccountId) -> usize {
        self.read().ledger.recipient_count(owner)
    }

    pub fn recipients(&self, owner: &AccountId) -> Vec<AccountId> {
        self.read().ledger.recipients(owner).to_vec()
    }

    /// Consistent copy of the whole ledger state.
    pub fn snapshot(&self) -> Ledger {
        self.read().ledger.clone()
    }

    /// Copy of the journal, suitable for export and later [`LedgerService::restore`].
    pub fn journal(&self) -> Journal {
        self.read().journal.clone()
    }

    // Queries never fail: a mutation is all-or-nothing, so state behind a
    // poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(
        &self,
        caller: AccountId,
        command: LedgerCommand,
        payout: Option<Amount>,
    ) -> Result<Vec<LedgerEnvelope>, ServiceError> {
        let mut guard = self.state.write().map_err(|_| ServiceError::Poisoned)?;
        let State { ledger, journal } = &mut *guard;

        // 1) Decide
        let decided = match ledger.handle(&command) {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(caller = %caller, error = %err, "ledger call rejected");
                return Err(err.into());
            }
        };
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 2) Stage
        let staged = journal.stage(decided.clone(), ExpectedVersion::Exact(ledger.version()))?;

        // 3) Pay out before anything becomes visible
        if let Some(amount) = payout {
            if let Err(err) = self.payout.transfer(caller, amount) {
                tracing::warn!(
                    caller = %caller,
                    amount = %amount,
                    error = %err,
                    "payout failed; withdraw aborted"
                );
                return Err(err.into());
            }
            tracing::info!(caller = %caller, amount = %amount, "payout sent");
        }

        // 4) Commit + apply
        let committed = staged.commit();
        for event in &decided {
            ledger.apply(event);
        }

        tracing::debug!(
            caller = %caller,
            version = ledger.version(),
            held = %ledger.contract_balance(),
            events = committed.len(),
            "ledger call committed"
        );

        // 5) Notify while still serialized, so delivery follows journal order
        if self.config.publish_notifications {
            for envelope in &committed {
                self.publish(envelope);
            }
        }
        drop(guard);

        Ok(committed)
    }

    fn publish(&self, envelope: &EventEnvelope<LedgerEvent>) {
        if let Err(err) = self.bus.publish(envelope.clone()) {
            // The call is committed; the journal still holds the event.
            tracing::warn!(
                sequence_number = envelope.sequence_number(),
                event_type = envelope.event_type(),
                error = ?err,
                "failed to publish ledger notification"
            );
        }
    }
}

fn reject_value(ctx: &CallContext) -> Result<(), ServiceError> {
    if ctx.value.is_zero() {
        Ok(())
    } else {
        Err(ServiceError::UnexpectedValue(ctx.value))
    }
}
