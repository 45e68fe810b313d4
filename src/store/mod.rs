// User accounts, medical profiles and emergency contacts

pub mod storage;
pub mod types;

pub use storage::{FileBasedStore, ProfileStore};
pub use types::{
    ALLOWED_EMAIL_DOMAINS, AccountUpdate, BloodType, EmergencyContact, MedicalProfile,
    UserAccount, UserSession, validate_email,
};
