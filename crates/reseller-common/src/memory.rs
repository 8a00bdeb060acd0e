//! In-memory repository implementation (for testing and development)
//!
//! One `RwLock` guards every table so a `LedgerCommit` is applied atomically.

use crate::domain::*;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Default)]
struct Tables {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    invoices: HashMap<InvoiceId, Invoice>,
    billed_cycles: HashSet<(SubscriptionId, NaiveDate)>,
    /// Keyed by invoice: at most one commission per invoice
    commissions: HashMap<InvoiceId, Commission>,
    coupons: HashMap<CouponId, DiscountCoupon>,
    coupon_codes: HashMap<String, CouponId>,
    tickets: HashMap<TicketId, SupportTicket>,
    notifications: Vec<Notification>,
    notification_keys: HashSet<NotificationKey>,
    customers: HashMap<CustomerId, Customer>,
    users: HashMap<UserId, User>,
    software: HashMap<SoftwareId, Software>,
}

/// Seed data for an in-memory store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct Fixture {
    pub software: Vec<Software>,
    pub users: Vec<User>,
    pub customers: Vec<Customer>,
    pub subscriptions: Vec<Subscription>,
    pub invoices: Vec<Invoice>,
    pub commissions: Vec<Commission>,
    pub coupons: Vec<DiscountCoupon>,
    pub tickets: Vec<SupportTicket>,
}

/// In-memory store implementing every repository port
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from seed data, enforcing the same uniqueness rules as the ports
    pub fn from_fixture(fixture: Fixture) -> RepoResult<Self> {
        let store = Self::new();
        for sw in fixture.software {
            store.seed_software(sw);
        }
        for user in fixture.users {
            store.seed_user(user);
        }
        {
            let mut t = store.tables.write();
            for customer in fixture.customers {
                if t.customers.values().any(|c| c.email.eq_ignore_ascii_case(&customer.email)) {
                    return Err(RepositoryError::duplicate(Entity::Customer, &customer.email));
                }
                t.customers.insert(customer.id.clone(), customer);
            }
            for sub in fixture.subscriptions {
                t.subscriptions.insert(sub.id.clone(), sub);
            }
            for invoice in fixture.invoices {
                insert_invoice(&mut t, invoice)?;
            }
            for commission in fixture.commissions {
                if t.commissions.contains_key(&commission.invoice_id) {
                    return Err(RepositoryError::duplicate(Entity::Commission, &commission.invoice_id));
                }
                t.commissions.insert(commission.invoice_id.clone(), commission);
            }
            for coupon in fixture.coupons {
                insert_coupon(&mut t, coupon)?;
            }
            for ticket in fixture.tickets {
                t.tickets.insert(ticket.id.clone(), ticket);
            }
            debug!(
                subscriptions = t.subscriptions.len(),
                invoices = t.invoices.len(),
                coupons = t.coupons.len(),
                "Store seeded from fixture"
            );
        }
        Ok(store)
    }

    /// Add or replace a catalog entry
    pub fn seed_software(&self, software: Software) {
        self.tables.write().software.insert(software.id.clone(), software);
    }

    /// Add or replace a platform user
    pub fn seed_user(&self, user: User) {
        self.tables.write().users.insert(user.id.clone(), user);
    }

    /// Insert a subscription as-is, bypassing the ledger (fixtures and tests)
    pub fn seed_subscription(&self, subscription: Subscription) {
        self.tables.write().subscriptions.insert(subscription.id.clone(), subscription);
    }

    /// Stored invoices
    pub fn invoice_count(&self) -> usize {
        self.tables.read().invoices.len()
    }

    /// Stored commissions
    pub fn commission_count(&self) -> usize {
        self.tables.read().commissions.len()
    }

    /// Stored notifications
    pub fn notification_count(&self) -> usize {
        self.tables.read().notifications.len()
    }
}

fn insert_invoice(t: &mut Tables, invoice: Invoice) -> RepoResult<()> {
    if t.invoices.contains_key(&invoice.id) {
        return Err(RepositoryError::duplicate(Entity::Invoice, &invoice.id));
    }
    if let Some(cycle) = invoice.cycle_start {
        if !t.billed_cycles.insert((invoice.subscription_id.clone(), cycle)) {
            return Err(RepositoryError::duplicate(
                Entity::Invoice,
                format!("{}@{}", invoice.subscription_id, cycle),
            ));
        }
    }
    t.invoices.insert(invoice.id.clone(), invoice);
    Ok(())
}

fn check_dates(subscription: &Subscription) -> RepoResult<()> {
    if subscription.dates_consistent() {
        return Ok(());
    }
    Err(DomainError::InvariantViolation(format!(
        "subscription {} billing/renewal date precedes start date {}",
        subscription.id, subscription.start_date
    ))
    .into())
}

fn insert_coupon(t: &mut Tables, coupon: DiscountCoupon) -> RepoResult<()> {
    coupon.discount.validate()?;
    let code = DiscountCoupon::normalize_code(&coupon.code);
    if t.coupon_codes.contains_key(&code) {
        return Err(RepositoryError::duplicate(Entity::Coupon, code));
    }
    t.coupon_codes.insert(code, coupon.id.clone());
    t.coupons.insert(coupon.id.clone(), coupon);
    Ok(())
}

fn sorted_invoices(mut invoices: Vec<Invoice>) -> Vec<Invoice> {
    invoices.sort_by(|a, b| a.issue_date.cmp(&b.issue_date).then_with(|| a.id.cmp(&b.id)));
    invoices
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn get(&self, id: &SubscriptionId) -> RepoResult<Option<Subscription>> {
        Ok(self.tables.read().subscriptions.get(id).cloned())
    }

    async fn update(&self, subscription: &Subscription, expected_version: u64) -> RepoResult<Subscription> {
        check_dates(subscription)?;
        let mut t = self.tables.write();
        let stored = t
            .subscriptions
            .get_mut(&subscription.id)
            .ok_or_else(|| RepositoryError::not_found(Entity::Subscription, &subscription.id))?;
        if stored.version != expected_version {
            return Err(RepositoryError::Conflict {
                entity: Entity::Subscription,
                key: subscription.id.to_string(),
                expected: expected_version,
                found: stored.version,
            });
        }
        let mut next = subscription.clone();
        next.version = expected_version + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn list_billing_due(&self, before: NaiveDate) -> RepoResult<Vec<Subscription>> {
        let mut due: Vec<_> = self
            .tables
            .read()
            .subscriptions
            .values()
            .filter(|s| s.next_billing_date < before)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_billing_date.cmp(&b.next_billing_date).then_with(|| a.id.cmp(&b.id)));
        Ok(due)
    }

    async fn list_for_customer(&self, customer_id: &CustomerId) -> RepoResult<Vec<Subscription>> {
        let mut subs: Vec<_> = self
            .tables
            .read()
            .subscriptions
            .values()
            .filter(|s| &s.customer_id == customer_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(subs)
    }

    async fn list(&self) -> RepoResult<Vec<Subscription>> {
        let mut subs: Vec<_> = self.tables.read().subscriptions.values().cloned().collect();
        subs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(subs)
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryStore {
    async fn get(&self, id: &InvoiceId) -> RepoResult<Option<Invoice>> {
        Ok(self.tables.read().invoices.get(id).cloned())
    }

    async fn list_for_subscription(&self, subscription_id: &SubscriptionId) -> RepoResult<Vec<Invoice>> {
        let invoices = self
            .tables
            .read()
            .invoices
            .values()
            .filter(|i| &i.subscription_id == subscription_id)
            .cloned()
            .collect();
        Ok(sorted_invoices(invoices))
    }

    async fn list_for_customer(&self, customer_id: &CustomerId) -> RepoResult<Vec<Invoice>> {
        let invoices = self
            .tables
            .read()
            .invoices
            .values()
            .filter(|i| &i.customer_id == customer_id)
            .cloned()
            .collect();
        Ok(sorted_invoices(invoices))
    }

    async fn list_unpaid(&self) -> RepoResult<Vec<Invoice>> {
        let invoices = self
            .tables
            .read()
            .invoices
            .values()
            .filter(|i| !i.is_paid())
            .cloned()
            .collect();
        Ok(sorted_invoices(invoices))
    }

    async fn list_paid_between(&self, from: NaiveDate, to: NaiveDate) -> RepoResult<Vec<Invoice>> {
        let invoices = self
            .tables
            .read()
            .invoices
            .values()
            .filter(|i| i.payment_date.map(|d| d >= from && d <= to).unwrap_or(false))
            .cloned()
            .collect();
        Ok(sorted_invoices(invoices))
    }
}

#[async_trait]
impl CommissionRepository for InMemoryStore {
    async fn find_by_invoice(&self, invoice_id: &InvoiceId) -> RepoResult<Option<Commission>> {
        Ok(self.tables.read().commissions.get(invoice_id).cloned())
    }

    async fn list_for_user(&self, user_id: &UserId) -> RepoResult<Vec<Commission>> {
        let mut list: Vec<_> = self
            .tables
            .read()
            .commissions
            .values()
            .filter(|c| &c.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn list(&self) -> RepoResult<Vec<Commission>> {
        let mut list: Vec<_> = self.tables.read().commissions.values().cloned().collect();
        list.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn commit(&self, commit: LedgerCommit) -> RepoResult<Subscription> {
        let LedgerCommit { subscription, expected_version, invoice, commission } = commit;
        let mut t = self.tables.write();

        // Validate everything before touching any table
        check_dates(&subscription)?;
        match (expected_version, t.subscriptions.get(&subscription.id)) {
            (None, Some(_)) => {
                return Err(RepositoryError::duplicate(Entity::Subscription, &subscription.id));
            }
            (Some(_), None) => {
                return Err(RepositoryError::not_found(Entity::Subscription, &subscription.id));
            }
            (Some(expected), Some(stored)) if stored.version != expected => {
                return Err(RepositoryError::Conflict {
                    entity: Entity::Subscription,
                    key: subscription.id.to_string(),
                    expected,
                    found: stored.version,
                });
            }
            _ => {}
        }
        if t.invoices.contains_key(&invoice.id) {
            return Err(RepositoryError::duplicate(Entity::Invoice, &invoice.id));
        }
        if let Some(cycle) = invoice.cycle_start {
            if t.billed_cycles.contains(&(invoice.subscription_id.clone(), cycle)) {
                return Err(RepositoryError::duplicate(
                    Entity::Invoice,
                    format!("{}@{}", invoice.subscription_id, cycle),
                ));
            }
        }
        if let Some(c) = &commission {
            if c.invoice_id != invoice.id || t.commissions.contains_key(&c.invoice_id) {
                return Err(RepositoryError::duplicate(Entity::Commission, &c.invoice_id));
            }
        }

        let mut stored = subscription;
        stored.version = expected_version.map(|v| v + 1).unwrap_or(0);
        insert_invoice(&mut t, invoice)?;
        if let Some(c) = commission {
            t.commissions.insert(c.invoice_id.clone(), c);
        }
        t.subscriptions.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl CouponRepository for InMemoryStore {
    async fn insert(&self, coupon: &DiscountCoupon) -> RepoResult<()> {
        insert_coupon(&mut self.tables.write(), coupon.clone())
    }

    async fn update(&self, coupon: &DiscountCoupon) -> RepoResult<()> {
        coupon.discount.validate()?;
        let mut t = self.tables.write();
        let previous = t
            .coupons
            .get(&coupon.id)
            .map(|c| DiscountCoupon::normalize_code(&c.code))
            .ok_or_else(|| RepositoryError::not_found(Entity::Coupon, &coupon.id))?;
        let code = DiscountCoupon::normalize_code(&coupon.code);
        if code != previous {
            if t.coupon_codes.contains_key(&code) {
                return Err(RepositoryError::duplicate(Entity::Coupon, code));
            }
            t.coupon_codes.remove(&previous);
            t.coupon_codes.insert(code, coupon.id.clone());
        }
        t.coupons.insert(coupon.id.clone(), coupon.clone());
        Ok(())
    }

    async fn get(&self, id: &CouponId) -> RepoResult<Option<DiscountCoupon>> {
        Ok(self.tables.read().coupons.get(id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> RepoResult<Option<DiscountCoupon>> {
        let t = self.tables.read();
        Ok(t
            .coupon_codes
            .get(&DiscountCoupon::normalize_code(code))
            .and_then(|id| t.coupons.get(id))
            .cloned())
    }

    async fn list(&self) -> RepoResult<Vec<DiscountCoupon>> {
        let mut list: Vec<_> = self.tables.read().coupons.values().cloned().collect();
        list.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(list)
    }
}

#[async_trait]
impl TicketRepository for InMemoryStore {
    async fn insert(&self, ticket: &SupportTicket) -> RepoResult<()> {
        let mut t = self.tables.write();
        if t.tickets.contains_key(&ticket.id) {
            return Err(RepositoryError::duplicate(Entity::Ticket, &ticket.id));
        }
        t.tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(())
    }

    async fn get(&self, id: &TicketId) -> RepoResult<Option<SupportTicket>> {
        Ok(self.tables.read().tickets.get(id).cloned())
    }

    async fn list_reminder_candidates(&self, due_on_or_before: NaiveDate) -> RepoResult<Vec<SupportTicket>> {
        let mut list: Vec<_> = self
            .tables
            .read()
            .tickets
            .values()
            .filter(|t| t.wants_reminders() && t.due_date.map(|d| d <= due_on_or_before).unwrap_or(false))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryStore {
    async fn insert_if_absent(&self, notification: &Notification) -> RepoResult<bool> {
        let mut t = self.tables.write();
        if !t.notification_keys.insert(notification.dedup_key()) {
            return Ok(false);
        }
        t.notifications.push(notification.clone());
        Ok(true)
    }

    async fn get(&self, id: &NotificationId) -> RepoResult<Option<Notification>> {
        Ok(self.tables.read().notifications.iter().find(|n| &n.id == id).cloned())
    }

    async fn find_for_ticket(&self, ticket_id: &TicketId, kind: NotificationType) -> RepoResult<Vec<Notification>> {
        Ok(self
            .tables
            .read()
            .notifications
            .iter()
            .filter(|n| &n.ticket_id == ticket_id && n.kind == kind)
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: &UserId) -> RepoResult<Vec<Notification>> {
        // Stored in insertion order; newest first for readers
        Ok(self
            .tables
            .read()
            .notifications
            .iter()
            .rev()
            .filter(|n| &n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: &NotificationId) -> RepoResult<Notification> {
        let mut t = self.tables.write();
        let n = t
            .notifications
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| RepositoryError::not_found(Entity::Notification, id))?;
        n.is_read = true;
        Ok(n.clone())
    }
}

#[async_trait]
impl PriceCatalog for InMemoryStore {
    async fn get_software(&self, id: &SoftwareId) -> RepoResult<Option<Software>> {
        Ok(self.tables.read().software.get(id).cloned())
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryStore {
    async fn get_customer(&self, id: &CustomerId) -> RepoResult<Option<Customer>> {
        Ok(self.tables.read().customers.get(id).cloned())
    }

    async fn insert_customer(&self, customer: &Customer) -> RepoResult<()> {
        let mut t = self.tables.write();
        if t.customers.contains_key(&customer.id)
            || t.customers.values().any(|c| c.email.eq_ignore_ascii_case(&customer.email))
        {
            return Err(RepositoryError::duplicate(Entity::Customer, &customer.email));
        }
        t.customers.insert(customer.id.clone(), customer.clone());
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> RepoResult<Option<User>> {
        Ok(self.tables.read().users.get(id).cloned())
    }

    async fn find_user_by_referral_code(&self, code: &str) -> RepoResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.referral_code.as_deref() == Some(code))
            .cloned())
    }

    async fn list_users_by_role(&self, role: UserRole) -> RepoResult<Vec<User>> {
        let mut users: Vec<_> = self
            .tables
            .read()
            .users
            .values()
            .filter(|u| u.role == role)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }
}
