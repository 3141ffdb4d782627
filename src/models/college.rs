use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Represents the 'colleges' table. Static reference data.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct College {
    pub id: Uuid,
    pub name: String,

    /// Sign-up emails must belong to this domain, e.g. `iitb.ac.in`.
    pub email_domain: String,
}

impl College {
    /// True when the part after the last `@` equals the college domain (case-insensitive).
    pub fn accepts_email(&self, email: &str) -> bool {
        match email.trim().rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() => {
                domain.eq_ignore_ascii_case(self.email_domain.trim())
            }
            _ => false,
        }
    }
}

/// Represents the 'departments' table, scoped to a college.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub college_id: Uuid,
}
