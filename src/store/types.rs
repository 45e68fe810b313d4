// Account, medical profile and emergency contact records

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;

/// Mail providers accepted at registration and on profile updates.
pub const ALLOWED_EMAIL_DOMAINS: [&str; 6] = [
    "gmail.com",
    "hotmail.com",
    "outlook.com",
    "yahoo.com",
    "live.com",
    "icloud.com",
];

/// Check the address shape and that its domain is one of [`ALLOWED_EMAIL_DOMAINS`].
/// Returns the normalized (trimmed, lowercase) address.
pub fn validate_email(email: &str) -> Result<String, DispatchError> {
    let email = email.trim().to_lowercase();
    let invalid = |reason: &str| DispatchError::InvalidUserInput {
        field: "email".to_string(),
        reason: reason.to_string(),
    };

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| invalid("missing '@'"))?;
    if local.is_empty() || local.contains(char::is_whitespace) || domain.contains('@') {
        return Err(invalid("malformed address"));
    }
    if !ALLOWED_EMAIL_DOMAINS.contains(&domain) {
        return Err(invalid(&format!(
            "domain {} not accepted, use one of: {}",
            domain,
            ALLOWED_EMAIL_DOMAINS.join(", ")
        )));
    }
    Ok(email)
}

fn require(field: &str, value: &str) -> Result<String, DispatchError> {
    let value = value.trim();
    if value.is_empty() {
        Err(DispatchError::InvalidUserInput {
            field: field.to_string(),
            reason: "cannot be empty".to_string(),
        })
    } else {
        Ok(value.to_string())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
    Unknown,
}

impl BloodType {
    pub const ALL: [BloodType; 9] = [
        BloodType::APositive,
        BloodType::ANegative,
        BloodType::BPositive,
        BloodType::BNegative,
        BloodType::AbPositive,
        BloodType::AbNegative,
        BloodType::OPositive,
        BloodType::ONegative,
        BloodType::Unknown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BloodType::APositive => "A+",
            BloodType::ANegative => "A-",
            BloodType::BPositive => "B+",
            BloodType::BNegative => "B-",
            BloodType::AbPositive => "AB+",
            BloodType::AbNegative => "AB-",
            BloodType::OPositive => "O+",
            BloodType::ONegative => "O-",
            BloodType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BloodType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        BloodType::ALL
            .into_iter()
            .find(|blood_type| blood_type.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| DispatchError::InvalidUserInput {
                field: "blood_type".to_string(),
                reason: format!("{} is not one of A+, A-, B+, B-, AB+, AB-, O+, O-, Unknown", s),
            })
    }
}

/// Health details shown to the rescue team. Measurements are free text, as typed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct MedicalProfile {
    pub blood_type: Option<BloodType>,
    pub age: Option<String>,
    pub weight: Option<String>,
    pub height: Option<String>,
    pub allergies: Option<String>,
    pub medications: Option<String>,
}

impl MedicalProfile {
    /// Missing blood type or allergies. The user is warned before calling for help.
    pub fn is_incomplete(&self) -> bool {
        let blank = |value: &Option<String>| value.as_deref().is_none_or(|v| v.trim().is_empty());
        self.blood_type.is_none() || blank(&self.allergies)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserAccount {
    pub id: u64,
    pub email: String,
    /// Stored as typed. Credential hardening is out of scope for this simulator.
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profile: MedicalProfile,
}

/// Proof of a successful login or registration, required by every per-user operation.
///
/// Only the store hands these out; [`ProfileStore::logout`](super::ProfileStore::logout)
/// consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct UserSession {
    user_id: u64,
    email: String,
}

impl UserSession {
    pub(crate) fn new(user_id: u64, email: String) -> Self {
        Self { user_id, email }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}

/// Fields to change on an account. `None` leaves a field as it is.
#[derive(Clone, Debug, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub blood_type: Option<BloodType>,
    pub age: Option<String>,
    pub weight: Option<String>,
    pub height: Option<String>,
    pub allergies: Option<String>,
    pub medications: Option<String>,
}

impl AccountUpdate {
    /// Validate and write the changes into `account`. Leaves `account` untouched on error.
    pub(crate) fn apply_to(self, account: &mut UserAccount) -> Result<(), DispatchError> {
        let email = self.email.as_deref().map(validate_email).transpose()?;
        let name = self.name.as_deref().map(|v| require("name", v)).transpose()?;
        let password = self
            .password
            .as_deref()
            .map(|v| require("password", v))
            .transpose()?;

        if let Some(email) = email {
            account.email = email;
        }
        if let Some(name) = name {
            account.name = name;
        }
        if let Some(password) = password {
            account.password = password;
        }
        if let Some(phone) = self.phone {
            account.phone = Some(phone.trim().to_string());
        }

        let profile = &mut account.profile;
        if let Some(blood_type) = self.blood_type {
            profile.blood_type = Some(blood_type);
        }
        for (slot, value) in [
            (&mut profile.age, self.age),
            (&mut profile.weight, self.weight),
            (&mut profile.height, self.height),
            (&mut profile.allergies, self.allergies),
            (&mut profile.medications, self.medications),
        ] {
            if let Some(value) = value {
                *slot = Some(value.trim().to_string());
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmergencyContact {
    pub id: u64,
    pub user_id: u64,
    pub name: String,
    pub phone: String,
}

impl EmergencyContact {
    pub(crate) fn new(id: u64, user_id: u64, name: &str, phone: &str) -> Result<Self, DispatchError> {
        Ok(Self {
            id,
            user_id,
            name: require("contact_name", name)?,
            phone: require("contact_phone", phone)?,
        })
    }
}
