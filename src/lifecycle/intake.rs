//! Submission intake
//!
//! Validates a raw submission and turns it into a new application record.
//! Every failing field is reported, not just the first one.

use bson::{oid::ObjectId, DateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::db::schemas::{
    ApplicationStatus, DocumentSlots, EmploymentStatus, LoanApplicationDoc, LoanTerm, LoanType,
    Metadata,
};
use crate::types::{FieldError, LoanDeskError, Result};

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern compiles"));

/// A number that may arrive as JSON number or as a form-encoded string
///
/// Any other JSON value is kept as `Mismatched` so validation can name the
/// field instead of failing the whole body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
    Mismatched(Value),
}

impl Numeric {
    fn value(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => s.trim().parse().ok(),
            Numeric::Mismatched(_) => None,
        }
        .filter(|n: &f64| n.is_finite())
    }
}

impl From<f64> for Numeric {
    fn from(n: f64) -> Self {
        Numeric::Number(n)
    }
}

/// A text field; non-string JSON values are kept as `Mismatched`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Text {
    Str(String),
    Mismatched(Value),
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Text::Str(s.to_string())
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Text::Str(s)
    }
}

/// Raw submission as received from the client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub first_name: Option<Text>,
    pub last_name: Option<Text>,
    pub email: Option<Text>,
    pub phone: Option<Text>,
    pub address: Option<Text>,
    pub city: Option<Text>,
    pub state: Option<Text>,
    pub zip_code: Option<Text>,
    pub employment_status: Option<Text>,
    pub employer: Option<Text>,
    pub monthly_income: Option<Numeric>,
    pub loan_type: Option<Text>,
    pub loan_amount: Option<Numeric>,
    pub loan_term: Option<Numeric>,
}

/// Trimmed value, `None` when absent or blank. A non-string value is
/// reported against `field`.
pub(crate) fn optional(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: &Option<Text>,
    label: &str,
) -> Option<String> {
    match value {
        None => None,
        Some(Text::Str(s)) => Some(s.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        Some(Text::Mismatched(_)) => {
            errors.push(FieldError::new(field, format!("{label} must be a string")));
            None
        }
    }
}

pub(crate) fn required(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: &Option<Text>,
    label: &str,
) -> Option<String> {
    let reported = errors.len();
    let cleaned = optional(errors, field, value, label);
    if cleaned.is_none() && errors.len() == reported {
        errors.push(FieldError::new(field, format!("{label} is required")));
    }
    cleaned
}

fn amount(errors: &mut Vec<FieldError>, field: &str, value: &Option<Numeric>, label: &str) -> f64 {
    match value {
        None => {
            errors.push(FieldError::new(field, format!("{label} is required")));
            0.0
        }
        Some(raw) => match raw.value() {
            None => {
                errors.push(FieldError::new(field, format!("{label} must be a number")));
                0.0
            }
            Some(n) if n < 0.0 => {
                errors.push(FieldError::new(field, format!("{label} must not be negative")));
                0.0
            }
            Some(n) => n,
        },
    }
}

impl NewApplication {
    /// Validate and normalise into an unsaved record.
    ///
    /// The returned record has no ID, reference number or timeline yet;
    /// those are assigned when it is first persisted.
    pub fn into_record(self, owner: Option<ObjectId>, now: DateTime) -> Result<LoanApplicationDoc> {
        let mut errors = Vec::new();

        let first_name = required(&mut errors, "firstName", &self.first_name, "First name")
            .unwrap_or_default();
        let last_name = required(&mut errors, "lastName", &self.last_name, "Last name")
            .unwrap_or_default();

        let email = match required(&mut errors, "email", &self.email, "Email") {
            None => String::new(),
            Some(email) if !EMAIL_PATTERN.is_match(&email) => {
                errors.push(FieldError::new("email", "Please use a valid email address"));
                String::new()
            }
            Some(email) => email.to_lowercase(),
        };

        let phone = required(&mut errors, "phone", &self.phone, "Phone number").unwrap_or_default();
        let address = optional(&mut errors, "address", &self.address, "Address");
        let city = optional(&mut errors, "city", &self.city, "City");
        let state = optional(&mut errors, "state", &self.state, "State");
        let zip_code = optional(&mut errors, "zipCode", &self.zip_code, "Zip code");

        let employment_status = match required(
            &mut errors,
            "employmentStatus",
            &self.employment_status,
            "Employment status",
        ) {
            None => None,
            Some(raw) => {
                let parsed = EmploymentStatus::parse(&raw);
                if parsed.is_none() {
                    errors.push(FieldError::new(
                        "employmentStatus",
                        format!("`{raw}` is not a valid employment status"),
                    ));
                }
                parsed
            }
        };

        let employer = optional(&mut errors, "employer", &self.employer, "Employer");

        let monthly_income = amount(&mut errors, "monthlyIncome", &self.monthly_income, "Monthly income");

        let loan_type = match required(&mut errors, "loanType", &self.loan_type, "Loan type") {
            None => None,
            Some(raw) => {
                let parsed = LoanType::parse(&raw);
                if parsed.is_none() {
                    errors.push(FieldError::new("loanType", format!("`{raw}` is not a valid loan type")));
                }
                parsed
            }
        };

        let loan_amount = amount(&mut errors, "loanAmount", &self.loan_amount, "Loan amount");

        let loan_term = match self.loan_term.as_ref().map(Numeric::value) {
            None => {
                errors.push(FieldError::new("loanTerm", "Loan term is required"));
                None
            }
            Some(years) => {
                let parsed = years
                    .filter(|y| y.fract() == 0.0)
                    .and_then(|y| LoanTerm::new(y as i64));
                if parsed.is_none() {
                    errors.push(FieldError::new(
                        "loanTerm",
                        format!(
                            "Loan term must be one of {:?} years",
                            LoanTerm::ALLOWED_YEARS
                        ),
                    ));
                }
                parsed
            }
        };

        let (Some(employment_status), Some(loan_type), Some(loan_term)) =
            (employment_status, loan_type, loan_term)
        else {
            return Err(LoanDeskError::Validation(errors));
        };
        if !errors.is_empty() {
            return Err(LoanDeskError::Validation(errors));
        }

        Ok(LoanApplicationDoc {
            _id: None,
            metadata: Metadata::at(now),
            version: 0,
            first_name,
            last_name,
            email,
            phone,
            address,
            city,
            state,
            zip_code,
            employment_status,
            employer,
            monthly_income,
            loan_type,
            loan_amount,
            loan_term,
            documents: DocumentSlots::default(),
            status: ApplicationStatus::Pending,
            application_date: now,
            user: owner,
            reference_number: None,
            timeline: Vec::new(),
            notes: Vec::new(),
        })
    }
}
