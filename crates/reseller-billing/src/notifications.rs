//! Notification center: ticket announcements and per-user inbox

use crate::error::{BillingError, BillingResult};
use crate::notify::NotificationSink;
use chrono::Utc;
use reseller_common::{
    CustomerDirectory, Notification, NotificationId, NotificationRepository, NotificationType, SupportTicket,
    TicketRepository, UserId, UserRole,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Ticket announcements and per-user notification inbox
pub struct NotificationCenter {
    notifications: Arc<dyn NotificationRepository>,
    tickets: Arc<dyn TicketRepository>,
    directory: Arc<dyn CustomerDirectory>,
    sink: Arc<dyn NotificationSink>,
}

impl NotificationCenter {
    /// Center over the notification, ticket and user stores
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        tickets: Arc<dyn TicketRepository>,
        directory: Arc<dyn CustomerDirectory>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { notifications, tickets, directory, sink }
    }

    /// Store a new ticket and tell every admin about it
    pub async fn open_ticket(&self, ticket: SupportTicket) -> BillingResult<Vec<Notification>> {
        self.tickets.insert(&ticket).await?;
        let admins = self.directory.list_users_by_role(UserRole::Admin).await?;
        let admin_ids: Vec<UserId> = admins.into_iter().map(|u| u.id).collect();
        self.announce_new_ticket(&ticket, &admin_ids).await
    }

    /// One `NEW_TICKET` notification per admin
    pub async fn announce_new_ticket(
        &self,
        ticket: &SupportTicket,
        admins: &[UserId],
    ) -> BillingResult<Vec<Notification>> {
        let creator = self
            .directory
            .get_user(&ticket.creator_id)
            .await?
            .map(|u| u.name)
            .unwrap_or_else(|| ticket.creator_id.to_string());
        let subject: String = ticket.subject.chars().take(30).collect();

        let mut created = Vec::with_capacity(admins.len());
        for admin in admins {
            let notification = Notification {
                id: NotificationId::generate(),
                user_id: admin.clone(),
                ticket_id: ticket.id.clone(),
                title: format!("New Ticket: {}", subject),
                message: format!("A new support ticket was created by {}.", creator),
                created_at: Utc::now(),
                is_read: false,
                kind: NotificationType::NewTicket,
            };
            if self.notifications.insert_if_absent(&notification).await? {
                self.sink
                    .notify(&notification.user_id, &notification.title, &notification.message)
                    .await;
                created.push(notification);
            }
        }
        info!(ticket = %ticket.id, admins = created.len(), "New ticket announced");
        Ok(created)
    }

    /// Newest first
    pub async fn list_for_user(&self, user: &UserId) -> BillingResult<Vec<Notification>> {
        Ok(self.notifications.list_for_user(user).await?)
    }

    /// Notifications `user` has not read yet
    pub async fn unread_count(&self, user: &UserId) -> BillingResult<usize> {
        Ok(self
            .notifications
            .list_for_user(user)
            .await?
            .iter()
            .filter(|n| !n.is_read)
            .count())
    }

    /// Idempotent
    pub async fn mark_read(&self, id: &NotificationId) -> BillingResult<Notification> {
        let existing = self
            .notifications
            .get(id)
            .await?
            .ok_or_else(|| BillingError::NotificationNotFound(id.clone()))?;
        if existing.is_read {
            return Ok(existing);
        }
        let read = self.notifications.mark_read(id).await?;
        debug!(notification = %id, "Notification marked read");
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingSink;
    use reseller_common::{InMemoryStore, TicketId, TicketPriority, TicketStatus, User};

    fn user(id: &str, name: &str, role: UserRole) -> User {
        User {
            id: UserId::new(id).unwrap(),
            name: name.into(),
            email: format!("{}@saas.com", id),
            role,
            referral_code: None,
        }
    }

    fn setup() -> (NotificationCenter, Arc<RecordingSink>) {
        let store = Arc::new(InMemoryStore::new());
        store.seed_user(user("user-admin-1", "Admin One", UserRole::Admin));
        store.seed_user(user("user-admin-2", "Admin Two", UserRole::Admin));
        store.seed_user(user("user-sales-1", "Sales Team A", UserRole::User));
        store.seed_user(user("user-customer-1", "Ravi Kumar", UserRole::Customer));
        let sink = Arc::new(RecordingSink::new());
        (NotificationCenter::new(store.clone(), store.clone(), store, sink.clone()), sink)
    }

    fn ticket() -> SupportTicket {
        SupportTicket {
            id: TicketId::new("ticket-1").unwrap(),
            creator_id: UserId::new("user-customer-1").unwrap(),
            related_customer_id: None,
            subject: "Invoice shows the wrong amount for March".into(),
            description: "Charged twice".into(),
            status: TicketStatus::Open,
            priority: TicketPriority::Medium,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            assigned_to_id: None,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn test_open_ticket_notifies_each_admin() {
        let (center, sink) = setup();
        let created = center.open_ticket(ticket()).await.unwrap();

        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|n| n.kind == NotificationType::NewTicket));
        assert_eq!(created[0].title, "New Ticket: Invoice shows the wrong amount");
        assert_eq!(created[0].message, "A new support ticket was created by Ravi Kumar.");
        assert_eq!(sink.sent().len(), 2);

        let sales = UserId::new("user-sales-1").unwrap();
        assert!(center.list_for_user(&sales).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_and_unread_count() {
        let (center, _) = setup();
        let created = center.open_ticket(ticket()).await.unwrap();
        let admin = UserId::new("user-admin-1").unwrap();
        assert_eq!(center.unread_count(&admin).await.unwrap(), 1);

        let mine = created.iter().find(|n| n.user_id == admin).unwrap();
        assert!(center.mark_read(&mine.id).await.unwrap().is_read);
        assert!(center.mark_read(&mine.id).await.unwrap().is_read);
        assert_eq!(center.unread_count(&admin).await.unwrap(), 0);

        let err = center.mark_read(&NotificationId::new("notif-missing").unwrap()).await.unwrap_err();
        assert!(matches!(err, BillingError::NotificationNotFound(_)));
    }
}
