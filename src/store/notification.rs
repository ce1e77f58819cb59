//! Notification records and their CSV persistence

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

pub const NOTIFICATIONS_FILE: &str = "notifications.csv";

/// Category shown in the applicant's inbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    DocumentReview,
    DeclarationApproved,
    DeclarationRejected,
    Appointment,
    General,
    PensionDistribution,
}

/// Notification staged for delivery; gets an id only when its transaction commits
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: u32,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub related_id: Option<u32>,
    pub created_by_admin_id: Option<u32>,
}

/// Committed notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: u32,
    pub user_id: u32,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    /// Declaration or document the notification is about
    pub related_id: Option<u32>,
    pub is_read: bool,
    pub sent_at: NaiveDateTime,
    pub created_by_admin_id: Option<u32>,
}

impl Notification {
    pub fn from_new(notification_id: u32, new: NewNotification, sent_at: NaiveDateTime) -> Self {
        Self {
            notification_id,
            user_id: new.user_id,
            title: new.title,
            body: new.body,
            category: new.category,
            related_id: new.related_id,
            is_read: false,
            sent_at,
            created_by_admin_id: new.created_by_admin_id,
        }
    }
}

/// Load notifications; a missing file means no notifications yet
pub fn load_notifications(path: &Path) -> Result<Vec<Notification>, LoadError> {
    let file_path = path.join(NOTIFICATIONS_FILE);
    if !file_path.exists() {
        return Ok(Vec::new());
    }
    load_notifications_from_reader(File::open(file_path)?)
}

pub fn load_notifications_from_reader<R: Read>(reader: R) -> Result<Vec<Notification>, LoadError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut notifications = Vec::new();
    for result in csv_reader.deserialize() {
        notifications.push(result?);
    }
    Ok(notifications)
}

pub fn write_notifications<W: Write>(writer: W, notifications: &[Notification]) -> Result<(), LoadError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for notification in notifications {
        csv_writer.serialize(notification)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_written_notifications_load_back() {
        let sent_at = NaiveDate::from_ymd_opt(2024, 5, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let notification = Notification::from_new(
            7,
            NewNotification {
                user_id: 10,
                title: "Répartition".into(),
                body: "Votre part est de 75.00%".into(),
                category: NotificationCategory::PensionDistribution,
                related_id: Some(3),
                created_by_admin_id: None,
            },
            sent_at,
        );

        let mut buffer = Vec::new();
        write_notifications(&mut buffer, std::slice::from_ref(&notification)).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.contains("pension_distribution"));

        let reloaded = load_notifications_from_reader(buffer.as_slice()).unwrap();
        assert_eq!(reloaded, vec![notification]);
    }
}
