//! Order model
//!
//! An order is a client's booking request for one or more services with a
//! chosen master. Staff may move an order to any status at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Service;

/// Order status. Transitions are unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    NotApproved,
    Moderated,
    Spam,
    Approved,
    InAwaiting,
    Completed,
    Canceled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::NotApproved,
        OrderStatus::Moderated,
        OrderStatus::Spam,
        OrderStatus::Approved,
        OrderStatus::InAwaiting,
        OrderStatus::Completed,
        OrderStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::NotApproved => "not_approved",
            OrderStatus::Moderated => "moderated",
            OrderStatus::Spam => "spam",
            OrderStatus::Approved => "approved",
            OrderStatus::InAwaiting => "in_awaiting",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
        }
    }

    /// Human-readable label for staff pages
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::NotApproved => "Не подтвержден",
            OrderStatus::Moderated => "Прошел модерацию",
            OrderStatus::Spam => "Спам",
            OrderStatus::Approved => "Подтвержден",
            OrderStatus::InAwaiting => "В ожидании",
            OrderStatus::Completed => "Завершен",
            OrderStatus::Canceled => "Отменен",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid order status: {}", s))
    }
}

/// Stored order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub client_name: String,
    pub phone: String,
    pub comment: Option<String>,
    pub status: OrderStatus,
    /// Cleared when the master is deleted
    pub master_id: Option<i64>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

/// Order with its master name and services, for staff pages
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub status_label: &'static str,
    pub master_name: Option<String>,
    pub services: Vec<Service>,
}

/// Validated booking request
#[derive(Debug, Clone)]
pub struct CreateOrderInput {
    pub client_name: String,
    pub phone: String,
    pub comment: Option<String>,
    pub master_id: i64,
    pub service_ids: Vec<i64>,
    pub appointment_date: Option<DateTime<Utc>>,
}

/// Field of an order the staff search may look in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSearchField {
    Phone,
    Name,
    Comment,
}

impl OrderSearchField {
    /// Column the field maps to
    pub fn column(&self) -> &'static str {
        match self {
            OrderSearchField::Phone => "phone",
            OrderSearchField::Name => "client_name",
            OrderSearchField::Comment => "comment",
        }
    }
}

impl FromStr for OrderSearchField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phone" => Ok(Self::Phone),
            "name" => Ok(Self::Name),
            "comment" => Ok(Self::Comment),
            _ => Err(format!("Invalid search field: {}", s)),
        }
    }
}

/// Staff order search: case-insensitive substring over the selected fields,
/// OR-combined. No fields selected means no filtering.
#[derive(Debug, Clone, Default)]
pub struct OrderSearch {
    pub query: Option<String>,
    pub fields: Vec<OrderSearchField>,
}

impl OrderSearch {
    /// The search term when it actually filters anything
    pub fn active_query(&self) -> Option<&str> {
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() && !self.fields.is_empty() => Some(q),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_default() {
        for status in OrderStatus::ALL {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!(OrderStatus::default(), OrderStatus::NotApproved);
        assert!("done".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&OrderStatus::InAwaiting).unwrap();
        assert_eq!(json, "\"in_awaiting\"");
    }

    #[test]
    fn test_search_active_query() {
        let mut search = OrderSearch {
            query: Some("  89 ".into()),
            fields: vec![],
        };
        assert_eq!(search.active_query(), None);

        search.fields.push(OrderSearchField::Phone);
        assert_eq!(search.active_query(), Some("89"));

        search.query = Some("   ".into());
        assert_eq!(search.active_query(), None);
    }
}
