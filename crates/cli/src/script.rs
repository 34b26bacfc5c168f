use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use splitter_core::{AccountId, AggregateId, Amount};
use splitter_events::InMemoryEventBus;
use splitter_infra::{
    CallContext, Journal, LedgerConfig, LedgerEnvelope, LedgerService, RecordingPayout,
    ServiceError,
};
use splitter_ledger::LedgerId;

/// One call in a script. Accounts are referred to by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Register { caller: String, recipient: String },
    Split { caller: String, value: u64 },
    Withdraw { caller: String, amount: u64 },
}

impl Step {
    fn op(&self) -> &'static str {
        match self {
            Step::Register { .. } => "register",
            Step::Split { .. } => "split",
            Step::Withdraw { .. } => "withdraw",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final state after a script run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub steps: Vec<StepOutcome>,
    pub balances: BTreeMap<String, u64>,
    pub payouts: BTreeMap<String, u64>,
    pub contract_balance: u64,
    #[serde(skip)]
    pub journal: Option<Journal>,
}

/// Name → account mapping. `"zero"` is the invalid sentinel.
#[derive(Debug, Default)]
struct Directory {
    by_name: BTreeMap<String, AccountId>,
}

impl Directory {
    const ZERO: &'static str = "zero";

    fn resolve(&mut self, name: &str) -> AccountId {
        if name == Self::ZERO {
            return AccountId::INVALID;
        }
        *self
            .by_name
            .entry(name.to_string())
            .or_insert_with(AccountId::new)
    }
}

type ScriptService = LedgerService<Arc<RecordingPayout>, InMemoryEventBus<LedgerEnvelope>>;

/// Execute `steps` in order. Rejected steps are recorded and the run continues.
pub fn run(steps: &[Step], config: LedgerConfig) -> Report {
    let service: ScriptService = LedgerService::new(
        LedgerId::new(AggregateId::new()),
        config,
        Arc::new(RecordingPayout::new()),
        InMemoryEventBus::new(),
    );
    let mut directory = Directory::default();
    let mut outcomes = Vec::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        let result = apply_step(&service, &mut directory, step);
        match &result {
            Ok(()) => tracing::debug!(index, op = step.op(), "step applied"),
            Err(err) => tracing::info!(index, op = step.op(), error = %err, "step rejected"),
        }
        outcomes.push(StepOutcome {
            index,
            op: step.op(),
            ok: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        });
    }

    let balances = directory
        .by_name
        .iter()
        .map(|(name, id)| (name.clone(), service.balance_of(id).units()))
        .collect();
    let payouts = directory
        .by_name
        .iter()
        .map(|(name, id)| (name.clone(), service.payout().total_paid_to(id)))
        .filter(|(_, paid)| *paid > 0)
        .collect();

    Report {
        steps: outcomes,
        balances,
        payouts,
        contract_balance: service.contract_balance().units(),
        journal: Some(service.journal()),
    }
}

fn apply_step(
    service: &ScriptService,
    directory: &mut Directory,
    step: &Step,
) -> Result<(), ServiceError> {
    match step {
        Step::Register { caller, recipient } => {
            let caller = directory.resolve(caller);
            let recipient = directory.resolve(recipient);
            service.register_recipient(CallContext::new(caller), recipient)?;
        }
        Step::Split { caller, value } => {
            let caller = directory.resolve(caller);
            service.split(CallContext::with_value(caller, Amount::new(*value)))?;
        }
        Step::Withdraw { caller, amount } => {
            let caller = directory.resolve(caller);
            service.withdraw(CallContext::new(caller), Amount::new(*amount))?;
        }
    }
    Ok(())
}
