//! Property tests for allocation conservation
//!
//! Random command sequences run against the engine over in-memory ports.
//! After every command the stored state must satisfy the allocation
//! invariants, and a rejected command must leave the state untouched.

use std::sync::Arc;

use billing_engine::{BillingEngine, EnginePorts, EngineSettings};
use core_kernel::{ClientId, Clock, InvoiceId, LeaveType, Money, PaymentId};
use domain_billing::{AllocationTarget, BillingStore, InMemoryBillingStore, Invoice, Payment, PaymentAllocation};
use proptest::prelude::*;
use test_utils::{
    allocation_steps_strategy, assert_allocation_invariants, invoice_amount_strategy, positive_money_strategy,
    AllocationStep, DateFixtures, TargetSpec,
};

const INVOICES: usize = 4;

type Snapshot = (Vec<Invoice>, Vec<Payment>, Vec<PaymentAllocation>);

struct Harness {
    engine: BillingEngine,
    store: Arc<InMemoryBillingStore>,
    client: ClientId,
    invoices: Vec<InvoiceId>,
    payments: Vec<PaymentId>,
}

impl Harness {
    async fn new(amounts: &[Money]) -> Self {
        let store = Arc::new(InMemoryBillingStore::new());
        let ports = EnginePorts {
            billing: store.clone(),
            billing_references: store.clone(),
            ..EnginePorts::in_memory()
        };
        let clock: Arc<dyn Clock> = Arc::new(DateFixtures::clock());
        let engine = BillingEngine::new(ports, clock, EngineSettings::default());
        let client = ClientId::new();

        let mut invoices = Vec::new();
        for (i, amount) in amounts.iter().enumerate() {
            let invoice = engine
                .create_invoice(LeaveType::Sick, &format!("SL20240110{:02}", i), client, *amount)
                .await
                .unwrap();
            invoices.push(invoice.id);
        }

        Self {
            engine,
            store,
            client,
            invoices,
            payments: Vec::new(),
        }
    }

    async fn snapshot(&self) -> Snapshot {
        (
            self.store.list_invoices().await.unwrap(),
            self.store.all_payments().unwrap(),
            self.store.all_allocations().unwrap(),
        )
    }

    fn targets(&self, specs: &[TargetSpec]) -> Vec<AllocationTarget> {
        specs
            .iter()
            .map(|t| AllocationTarget::new(self.invoices[t.invoice], t.amount))
            .collect()
    }

    fn payment(&self, index: usize) -> Option<PaymentId> {
        if self.payments.is_empty() {
            None
        } else {
            Some(self.payments[index % self.payments.len()])
        }
    }

    /// Runs one step; `true` if the engine accepted it
    async fn apply(&mut self, step: &AllocationStep) -> bool {
        let engine = &self.engine;
        match step {
            AllocationStep::RecordPayment { amount, targets } => {
                let targets = self.targets(targets);
                match engine.record_payment(self.client, *amount, &targets).await {
                    Ok(outcome) => {
                        if let Some(payment) = outcome.payment {
                            self.payments.push(payment.id);
                        }
                        true
                    }
                    Err(_) => false,
                }
            }
            AllocationStep::Allocate { payment, targets } => match self.payment(*payment) {
                Some(id) => engine.allocate_payment(id, &self.targets(targets)).await.is_ok(),
                None => false,
            },
            AllocationStep::Reallocate { payment, targets } => match self.payment(*payment) {
                Some(id) => engine.reallocate_payment(id, &self.targets(targets)).await.is_ok(),
                None => false,
            },
            AllocationStep::Deallocate { payment } => match self.payment(*payment) {
                Some(id) => engine.deallocate_payment(id).await.is_ok(),
                None => false,
            },
            AllocationStep::DeletePayment { payment } => match self.payment(*payment) {
                Some(id) => {
                    let deleted = engine.delete_payment(id).await.is_ok();
                    if deleted {
                        self.payments.retain(|p| *p != id);
                    }
                    deleted
                }
                None => false,
            },
            AllocationStep::UpdateAmount { payment, amount } => match self.payment(*payment) {
                Some(id) => engine.update_payment_amount(id, *amount).await.is_ok(),
                None => false,
            },
            AllocationStep::CancelInvoice { invoice } => {
                engine.cancel_invoice(self.invoices[*invoice]).await.is_ok()
            }
        }
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_allocations_never_exceed_invoice_or_payment(
        amounts in prop::collection::vec(invoice_amount_strategy(), INVOICES),
        steps in allocation_steps_strategy(INVOICES, 24),
    ) {
        runtime().block_on(async {
            let mut harness = Harness::new(&amounts).await;

            for step in &steps {
                let before = harness.snapshot().await;
                let accepted = harness.apply(step).await;
                let after = harness.snapshot().await;

                if !accepted {
                    assert_eq!(before, after, "rejected step {:?} changed state", step);
                }
                assert_allocation_invariants(&after.0, &after.1, &after.2);
            }
        });
    }

    #[test]
    fn prop_refresh_after_random_workload_is_a_no_op(
        amounts in prop::collection::vec(invoice_amount_strategy(), INVOICES),
        steps in allocation_steps_strategy(INVOICES, 16),
    ) {
        runtime().block_on(async {
            let mut harness = Harness::new(&amounts).await;
            for step in &steps {
                harness.apply(step).await;
            }

            let report = harness.engine.refresh_all_invoice_statuses().await.unwrap();
            assert_eq!(report.updated, 0, "statuses drifted from allocations");
        });
    }

    #[test]
    fn prop_unallocated_payment_is_client_credit(amount in positive_money_strategy()) {
        runtime().block_on(async {
            let harness = Harness::new(&[]).await;
            let outcome = harness.engine.record_payment(harness.client, amount, &[]).await.unwrap();
            let payment = outcome.payment.unwrap();

            assert_eq!(harness.engine.unallocated_amount(payment.id).await.unwrap(), amount);
            let balance = harness.engine.get_client_balance(harness.client).await.unwrap();
            assert_eq!(balance, Money::new(-amount.amount()));
        });
    }
}
