//! Reminder Scheduler
//!
//! One pass derives due-soon and overdue notifications from ticket due
//! dates. A notification is created only if none of the same type exists for
//! the ticket, so repeated passes are no-ops. Nothing is ever retracted: a
//! ticket that went from due-soon to overdue keeps both notifications.

use crate::error::{BillingError, BillingResult};
use crate::notify::NotificationSink;
use chrono::{Duration, NaiveDate, Utc};
use reseller_common::{
    Notification, NotificationId, NotificationRepository, NotificationType, SupportTicket, TicketRepository,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of one reminder pass
#[derive(Debug, Clone, Default)]
pub struct ReminderReport {
    /// Candidate tickets looked at
    pub tickets_examined: usize,
    /// Notifications created by this pass
    pub created: Vec<Notification>,
}

/// Reminder scheduler
pub struct ReminderScheduler {
    tickets: Arc<dyn TicketRepository>,
    notifications: Arc<dyn NotificationRepository>,
    sink: Arc<dyn NotificationSink>,
    window_days: i64,
}

fn shorten(subject: &str, max: usize) -> String {
    if subject.chars().count() <= max {
        subject.to_string()
    } else {
        let head: String = subject.chars().take(max).collect();
        format!("{}...", head)
    }
}

impl ReminderScheduler {
    /// `window_days` ahead of today counts as due soon
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        notifications: Arc<dyn NotificationRepository>,
        sink: Arc<dyn NotificationSink>,
        window_days: i64,
    ) -> Self {
        Self { tickets, notifications, sink, window_days }
    }

    /// Which reminder a ticket warrants on `today`, if any
    pub fn classify(&self, ticket: &SupportTicket, today: NaiveDate) -> Option<NotificationType> {
        if !ticket.wants_reminders() {
            return None;
        }
        let due = ticket.due_date?;
        if due < today {
            Some(NotificationType::TaskOverdue)
        } else if due <= today.checked_add_signed(Duration::days(self.window_days)).unwrap_or(NaiveDate::MAX) {
            Some(NotificationType::TaskDueSoon)
        } else {
            None
        }
    }

    fn reminder(ticket: &SupportTicket, kind: NotificationType) -> Option<Notification> {
        let assignee = ticket.assigned_to_id.clone()?;
        let due = ticket.due_date?;
        let (title, message) = match kind {
            NotificationType::TaskOverdue => (
                format!("OVERDUE: {}", shorten(&ticket.subject, 20)),
                format!("This task was due on {}.", due),
            ),
            NotificationType::TaskDueSoon => (
                format!("Due Soon: {}", shorten(&ticket.subject, 20)),
                format!("This task is due on {}.", due),
            ),
            NotificationType::NewTicket => return None,
        };
        Some(Notification {
            id: NotificationId::generate(),
            user_id: assignee,
            ticket_id: ticket.id.clone(),
            title,
            message,
            created_at: Utc::now(),
            is_read: false,
            kind,
        })
    }

    /// Run one pass over all reminder candidates
    pub async fn run_pass(&self, today: NaiveDate) -> BillingResult<ReminderReport> {
        let horizon = today
            .checked_add_signed(Duration::days(self.window_days))
            .ok_or(BillingError::DateOutOfRange(today))?;
        let candidates = self.tickets.list_reminder_candidates(horizon).await?;

        let mut report = ReminderReport { tickets_examined: candidates.len(), ..Default::default() };
        for ticket in &candidates {
            let Some(kind) = self.classify(ticket, today) else {
                continue;
            };
            let Some(notification) = Self::reminder(ticket, kind) else {
                continue;
            };
            if !self.notifications.insert_if_absent(&notification).await? {
                debug!(ticket = %ticket.id, kind = ?kind, "Reminder already exists");
                continue;
            }
            self.sink
                .notify(&notification.user_id, &notification.title, &notification.message)
                .await;
            report.created.push(notification);
        }

        info!(
            today = %today,
            examined = report.tickets_examined,
            created = report.created.len(),
            "Reminder pass complete"
        );
        Ok(report)
    }
}
