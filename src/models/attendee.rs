use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TicketType;

/// Kind of institution a student attends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstitutionType {
    University,
    College,
    SecondarySchool,
    PrimarySchool,
    /// Requires an explicit institution name.
    Other,
}

impl InstitutionType {
    /// Maps free-text input to an institution type.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let value = raw.trim().to_lowercase();
        if value.is_empty() {
            return None;
        }
        let parsed = match value.as_str() {
            "university" | "uni" | "chuo kikuu" => InstitutionType::University,
            "college" | "chuo" => InstitutionType::College,
            "secondary" | "secondary_school" | "secondary school" | "sekondari" => {
                InstitutionType::SecondarySchool
            }
            "primary" | "primary_school" | "primary school" | "msingi" => {
                InstitutionType::PrimarySchool
            }
            _ => InstitutionType::Other,
        };
        Some(parsed)
    }
}

/// Student fields captured at purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentDetails {
    pub student_id: String,
    pub institution_type: Option<InstitutionType>,
    pub institution_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildDetails {
    pub parent_name: Option<String>,
}

/// Type-specific attendee data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendeeDetails {
    Adult,
    Student {
        student_id: String,
        institution_type: InstitutionType,
        institution_name: Option<String>,
        is_used: bool,
        scanned_at: Option<DateTime<Utc>>,
    },
    Child {
        parent_name: Option<String>,
    },
}

/// One admitted person on a ticket. A ticket of quantity `n` has `n` attendees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub full_name: String,
    pub phone_number: String,
    pub details: AttendeeDetails,
    pub created_at: DateTime<Utc>,
}

impl Attendee {
    pub fn new(
        ticket_id: Uuid,
        full_name: impl Into<String>,
        phone_number: impl Into<String>,
        details: AttendeeDetails,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            full_name: full_name.into(),
            phone_number: phone_number.into(),
            details,
            created_at: Utc::now(),
        }
    }

    pub fn ticket_type(&self) -> TicketType {
        match self.details {
            AttendeeDetails::Adult => TicketType::Adult,
            AttendeeDetails::Student { .. } => TicketType::Student,
            AttendeeDetails::Child { .. } => TicketType::Child,
        }
    }

    pub fn student_id(&self) -> Option<&str> {
        match &self.details {
            AttendeeDetails::Student { student_id, .. } => Some(student_id.as_str()),
            _ => None,
        }
    }

    /// Marks a student attendee as scanned. No-op for other types.
    pub fn mark_scanned(&mut self, at: DateTime<Utc>) {
        if let AttendeeDetails::Student { is_used, scanned_at, .. } = &mut self.details {
            *is_used = true;
            *scanned_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_institution_parse_loose() {
        assert_eq!(InstitutionType::parse_loose("University"), Some(InstitutionType::University));
        assert_eq!(InstitutionType::parse_loose(" secondary "), Some(InstitutionType::SecondarySchool));
        assert_eq!(InstitutionType::parse_loose("Madrasa"), Some(InstitutionType::Other));
        assert_eq!(InstitutionType::parse_loose(""), None);
    }

    #[test]
    fn test_student_attendee_scan() {
        let mut attendee = Attendee::new(
            Uuid::new_v4(),
            "Asha Juma",
            "255712345678",
            AttendeeDetails::Student {
                student_id: "UDSM-2021-001".to_string(),
                institution_type: InstitutionType::University,
                institution_name: None,
                is_used: false,
                scanned_at: None,
            },
        );

        assert_eq!(attendee.ticket_type(), TicketType::Student);
        assert_eq!(attendee.student_id(), Some("UDSM-2021-001"));

        let now = Utc::now();
        attendee.mark_scanned(now);
        match attendee.details {
            AttendeeDetails::Student { is_used, scanned_at, .. } => {
                assert!(is_used);
                assert_eq!(scanned_at, Some(now));
            }
            _ => panic!("expected student details"),
        }
    }

    #[test]
    fn test_attendee_details_tagging() {
        let json = serde_json::to_value(AttendeeDetails::Child { parent_name: Some("Mama Neema".into()) }).unwrap();
        assert_eq!(json["type"], "CHILD");
        assert_eq!(json["parent_name"], "Mama Neema");
    }
}
