//! End-to-end billing behavior through the platform facade

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reseller_billing::gateway::ApproveAll;
use reseller_billing::notify::RecordingSink;
use reseller_billing::{
    BillingConfig, BillingError, BillingPlatform, ChargeOutcome, NewCoupon, PaymentGateway, PaymentStatus,
    Repositories,
};
use reseller_common::{
    CommissionRepository, Customer, CustomerDirectory, CustomerId, DiscountType, InMemoryStore, InvoiceKind,
    InvoiceRepository, Money, Plan, PlanPricing, ProjectStatus, Software, SoftwareId, Subscription,
    SubscriptionId, SupportTicket, TicketId, TicketPriority, TicketRepository, TicketStatus, UserId,
};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn crm() -> SoftwareId {
    SoftwareId::new("sw-crm").unwrap()
}

struct Harness {
    store: Arc<InMemoryStore>,
    platform: BillingPlatform,
    sink: Arc<RecordingSink>,
}

fn harness_with(gateway: Arc<dyn PaymentGateway>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    store.seed_software(Software {
        id: crm(),
        name: "CRM Pro".into(),
        pricing: PlanPricing {
            monthly: Money::from_major(1000),
            quarterly: Money::from_major(2800),
            yearly: Money::from_major(10000),
        },
        setup_fee: Money::from_major(500),
    });
    let sink = Arc::new(RecordingSink::new());
    let platform = BillingPlatform::new(
        Repositories::in_memory(store.clone()),
        gateway,
        sink.clone(),
        BillingConfig::default(),
    )
    .unwrap();
    Harness { store, platform, sink }
}

fn harness() -> Harness {
    harness_with(Arc::new(ApproveAll))
}

async fn add_customer(store: &InMemoryStore, id: &str, referred_by: Option<&str>) -> CustomerId {
    let customer = Customer {
        id: CustomerId::new(id).unwrap(),
        name: id.into(),
        email: format!("{}@customer.com", id),
        company: "Innovate".into(),
        signup_date: date(2023, 8, 15),
        assigned_to_user_id: None,
        referred_by_user_id: referred_by.map(|u| UserId::new(u).unwrap()),
    };
    store.insert_customer(&customer).await.unwrap();
    customer.id
}

fn overdue_subscription(id: &str, customer: &CustomerId, next_billing: NaiveDate) -> Subscription {
    Subscription {
        id: SubscriptionId::new(id).unwrap(),
        customer_id: customer.clone(),
        software_id: crm(),
        plan: Plan::Monthly,
        start_date: date(2023, 12, 1),
        next_renewal_date: next_billing,
        next_billing_date: next_billing,
        renewal_amount: Money::from_major(1000),
        status: ProjectStatus::Complete,
        onboarding_date: date(2023, 12, 1),
        training_date: date(2023, 12, 5),
        next_action_date: None,
        remarks: None,
        version: 0,
    }
}

#[tokio::test]
async fn billing_cycle_catches_up_missed_cycles_once() {
    let h = harness();
    let customer = add_customer(&h.store, "cust-1", Some("user-sales-1")).await;
    h.store.seed_subscription(overdue_subscription("sub-1", &customer, date(2024, 1, 1)));

    let report = h.platform.run_billing_cycle(date(2024, 3, 15)).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.subscriptions_processed, 1);
    assert_eq!(report.invoices.len(), 2);
    let cycles: Vec<_> = report.invoices.iter().map(|i| i.cycle_start).collect();
    assert_eq!(cycles, vec![Some(date(2024, 1, 1)), Some(date(2024, 2, 1))]);
    assert!(report.invoices.iter().all(|i| !i.is_paid() && i.amount == Money::from_major(1000)));

    let sub = h.platform.ledger.get(&SubscriptionId::new("sub-1").unwrap()).await.unwrap();
    assert_eq!(sub.next_billing_date, date(2024, 3, 1));
    assert_eq!(sub.next_renewal_date, date(2024, 3, 1));

    // Recurring invoices are unpaid: no commission even for referred customers
    assert_eq!(h.store.commission_count(), 0);

    // Same day: already billed. Next day: the March cycle is due.
    let again = h.platform.run_billing_cycle(date(2024, 3, 15)).await.unwrap();
    assert!(again.invoices.is_empty());
    let next_day = h.platform.run_billing_cycle(date(2024, 3, 16)).await.unwrap();
    assert_eq!(next_day.invoices.len(), 1);
    assert_eq!(next_day.invoices[0].cycle_start, Some(date(2024, 3, 1)));
}

#[tokio::test]
async fn payment_resets_forward_instead_of_compounding() {
    let h = harness();
    let customer = add_customer(&h.store, "cust-1", None).await;
    h.store.seed_subscription(overdue_subscription("sub-1", &customer, date(2024, 1, 1)));
    let id = SubscriptionId::new("sub-1").unwrap();

    let receipt = h.platform.record_payment(&id, date(2024, 3, 15)).await.unwrap();

    assert_eq!(receipt.subscription.next_renewal_date, date(2024, 4, 15));
    assert_eq!(h.store.invoice_count(), 1);
    assert!(receipt.invoice.is_paid());
}

#[tokio::test]
async fn subscribe_then_bill_scenario() {
    let h = harness();
    let customer = add_customer(&h.store, "cust-c", None).await;

    let receipt = h
        .platform
        .subscribe(&customer, &crm(), Plan::Monthly, None, date(2024, 1, 10))
        .await
        .unwrap();
    assert_eq!(receipt.invoice.amount, Money::from_major(1500));
    assert_eq!(receipt.invoice.payment_date, Some(date(2024, 1, 10)));
    assert_eq!(receipt.subscription.next_renewal_date, date(2024, 2, 10));

    let report = h.platform.run_billing_cycle(date(2024, 2, 15)).await.unwrap();
    assert_eq!(report.invoices.len(), 1);
    let invoice = &report.invoices[0];
    assert_eq!(invoice.amount, Money::from_major(1000));
    assert_eq!(invoice.issue_date, date(2024, 2, 15));
    assert_eq!(invoice.payment_date, None);
    assert_eq!(invoice.kind, InvoiceKind::Recurring);

    let sub = h.platform.ledger.get(&receipt.subscription.id).await.unwrap();
    assert_eq!(sub.next_billing_date, date(2024, 3, 10));

    assert_eq!(
        h.platform.reports.subscription_status(&sub.id, date(2024, 2, 15)).await.unwrap(),
        PaymentStatus::Unpaid
    );
    assert_eq!(
        h.platform.reports.subscription_status(&sub.id, date(2024, 3, 11)).await.unwrap(),
        PaymentStatus::Overdue
    );
}

#[tokio::test]
async fn rerunning_a_pass_on_the_same_day_bills_nothing_new() {
    let h = harness();
    let customer = add_customer(&h.store, "cust-1", None).await;
    h.platform
        .subscribe(&customer, &crm(), Plan::Monthly, None, date(2024, 1, 10))
        .await
        .unwrap();

    assert_eq!(h.platform.run_billing_cycle(date(2024, 2, 15)).await.unwrap().invoices.len(), 1);
    let again = h.platform.run_billing_cycle(date(2024, 2, 15)).await.unwrap();
    assert!(again.invoices.is_empty());
    assert_eq!(again.subscriptions_processed, 0);
    assert_eq!(h.store.invoice_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_billing_runs_never_double_invoice() {
    let h = Arc::new(harness());
    let customer = add_customer(&h.store, "cust-1", None).await;
    for n in 0..10 {
        h.store
            .seed_subscription(overdue_subscription(&format!("sub-{}", n), &customer, date(2024, 1, 1)));
    }

    let runs: Vec<_> = (0..4)
        .map(|_| {
            let h = h.clone();
            tokio::spawn(async move { h.platform.run_billing_cycle(date(2024, 3, 15)).await })
        })
        .collect();
    let mut total = 0;
    for run in runs {
        total += run.await.unwrap().unwrap().invoices.len();
    }

    assert_eq!(total, 20);
    assert_eq!(h.store.invoice_count(), 20);
    for sub in h.platform.ledger.list().await.unwrap() {
        assert_eq!(sub.next_billing_date, date(2024, 3, 1));
        let invoices = h.store.list_for_subscription(&sub.id).await.unwrap();
        assert_eq!(invoices.len(), 2);
    }
}

#[tokio::test]
async fn at_most_one_commission_per_invoice_and_none_without_referral() {
    let h = harness();
    let referred = add_customer(&h.store, "cust-ref", Some("user-sales-1")).await;
    let direct = add_customer(&h.store, "cust-direct", None).await;

    let mut subs = Vec::new();
    for customer in [&referred, &direct] {
        let r = h
            .platform
            .subscribe(customer, &crm(), Plan::Quarterly, None, date(2024, 1, 10))
            .await
            .unwrap();
        subs.push(r.subscription.id);
    }
    for id in &subs {
        h.platform.record_payment(id, date(2024, 2, 1)).await.unwrap();
        h.platform.record_payment(id, date(2024, 2, 2)).await.unwrap();
    }

    let commissions = CommissionRepository::list(&*h.store).await.unwrap();
    assert_eq!(commissions.len(), 3);
    assert!(commissions.iter().all(|c| c.customer_id == referred));
    let mut invoice_ids: Vec<_> = commissions.iter().map(|c| c.invoice_id.clone()).collect();
    invoice_ids.sort();
    invoice_ids.dedup();
    assert_eq!(invoice_ids.len(), 3);

    for invoice in InvoiceRepository::list_for_customer(&*h.store, &direct).await.unwrap() {
        assert!(h.store.find_by_invoice(&invoice.id).await.unwrap().is_none());
    }

    // Purchase 2800 + 500, then two renewals of 2800
    let summary = h
        .platform
        .reports
        .commission_summary(&UserId::new("user-sales-1").unwrap())
        .await
        .unwrap();
    assert_eq!(summary.total, Money::from_major(660 + 560 + 560));
}

struct CountingDecliner(AtomicUsize);

#[async_trait]
impl PaymentGateway for CountingDecliner {
    async fn charge(&self, _customer: &CustomerId, _amount: Money) -> ChargeOutcome {
        self.0.fetch_add(1, Ordering::SeqCst);
        ChargeOutcome::Declined { reason: "insufficient funds".into() }
    }
}

#[tokio::test]
async fn declined_payment_has_no_partial_effects() {
    let gateway = Arc::new(CountingDecliner(AtomicUsize::new(0)));
    let h = harness_with(gateway.clone());
    let customer = add_customer(&h.store, "cust-1", Some("user-sales-1")).await;
    h.store.seed_subscription(overdue_subscription("sub-1", &customer, date(2024, 1, 1)));
    let id = SubscriptionId::new("sub-1").unwrap();
    let before = h.platform.ledger.get(&id).await.unwrap();

    let err = h.platform.record_payment(&id, date(2024, 3, 15)).await.unwrap_err();
    assert!(matches!(err, BillingError::PaymentDeclined { .. }));
    assert_eq!(gateway.0.load(Ordering::SeqCst), 1);
    assert_eq!(h.platform.ledger.get(&id).await.unwrap(), before);
    assert_eq!(h.store.invoice_count(), 0);
    assert_eq!(h.store.commission_count(), 0);
}

#[tokio::test]
async fn coupon_applies_through_last_valid_day() {
    let h = harness();
    h.platform
        .coupons
        .add(NewCoupon {
            code: "MIDYEAR".into(),
            discount: DiscountType::Percentage(dec!(10)),
            valid_from: date(2024, 6, 1),
            valid_until: date(2024, 6, 30),
            applicable_software_ids: vec![crm()],
        })
        .await
        .unwrap();

    let last_day = h
        .platform
        .coupons
        .quote_purchase(&crm(), Plan::Monthly, Some("midyear"), date(2024, 6, 30))
        .await
        .unwrap();
    assert_eq!(last_day.discount, Money::from_major(100));

    let after = h
        .platform
        .coupons
        .quote_purchase(&crm(), Plan::Monthly, Some("midyear"), date(2024, 7, 1))
        .await
        .unwrap();
    assert_eq!(after.discount, Money::ZERO);
}

#[tokio::test]
async fn coupon_discount_reaches_first_invoice_and_commission() {
    let h = harness();
    let customer = add_customer(&h.store, "cust-1", Some("user-sales-1")).await;
    h.platform
        .coupons
        .add(NewCoupon {
            code: "LAUNCH".into(),
            discount: DiscountType::FixedAmount(Money::from_major(200)),
            valid_from: date(2024, 1, 1),
            valid_until: date(2024, 12, 31),
            applicable_software_ids: vec![],
        })
        .await
        .unwrap();

    let receipt = h
        .platform
        .subscribe(&customer, &crm(), Plan::Monthly, Some("LAUNCH"), date(2024, 1, 10))
        .await
        .unwrap();
    assert_eq!(receipt.invoice.amount, Money::from_major(1300));
    assert_eq!(receipt.commission.map(|c| c.amount), Some(Money::from_major(260)));
    assert_eq!(receipt.subscription.renewal_amount, Money::from_major(1000));
}

#[tokio::test]
async fn reminder_pass_is_idempotent() {
    let h = harness();
    let now = Utc::now();
    for (id, due) in [("ticket-1", date(2024, 5, 9)), ("ticket-2", date(2024, 5, 11))] {
        TicketRepository::insert(
            &*h.store,
            &SupportTicket {
                id: TicketId::new(id).unwrap(),
                creator_id: UserId::new("user-customer-1").unwrap(),
                related_customer_id: None,
                subject: "Export fails".into(),
                description: "CSV export times out".into(),
                status: TicketStatus::Open,
                priority: TicketPriority::Medium,
                created_at: now,
                updated_at: now,
                assigned_to_id: Some(UserId::new("user-sales-1").unwrap()),
                due_date: Some(due),
            },
        )
        .await
        .unwrap();
    }

    let first = h.platform.run_reminder_pass(date(2024, 5, 10)).await.unwrap();
    let second = h.platform.run_reminder_pass(date(2024, 5, 10)).await.unwrap();
    assert_eq!(first.created.len(), 2);
    assert!(second.created.is_empty());
    assert_eq!(h.store.notification_count(), 2);
    assert_eq!(h.sink.sent().len(), 2);
}

#[tokio::test]
async fn revenue_counts_paid_invoices_in_range() {
    let h = harness();
    let customer = add_customer(&h.store, "cust-1", None).await;
    let id = h
        .platform
        .subscribe(&customer, &crm(), Plan::Monthly, None, date(2024, 1, 10))
        .await
        .unwrap()
        .subscription
        .id;
    h.platform.run_billing_cycle(date(2024, 2, 15)).await.unwrap();
    h.platform.record_payment(&id, date(2024, 2, 20)).await.unwrap();

    let jan = h.platform.reports.revenue_between(date(2024, 1, 1), date(2024, 1, 31)).await.unwrap();
    let q1 = h.platform.reports.revenue_between(date(2024, 1, 1), date(2024, 3, 31)).await.unwrap();
    assert_eq!(jan, Money::from_major(1500));
    assert_eq!(q1, Money::from_major(2500));

    // The renewal pushed billing to 2024-04-10; the February invoice is still unpaid
    assert!(h.platform.reports.overdue_invoices(date(2024, 4, 10)).await.unwrap().is_empty());
    let overdue = h.platform.reports.overdue_invoices(date(2024, 4, 11)).await.unwrap();
    assert_eq!(overdue.len(), 1);
}
