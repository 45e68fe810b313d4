// File-backed persistence for accounts and emergency contacts

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;

use super::types::{
    AccountUpdate, EmergencyContact, MedicalProfile, UserAccount, UserSession, validate_email,
};

const STORE_FILE_NAME: &str = "profiles.json";

/// Interface to the user's account, medical profile and emergency contacts.
///
/// Everything that belongs to a user is reached through the [`UserSession`] returned
/// by [`register`](ProfileStore::register) or [`login`](ProfileStore::login).
pub trait ProfileStore {
    /// Create an account and log it in. E-mails are unique.
    fn register(
        &mut self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<UserSession, DispatchError>;

    fn login(&self, email: &str, password: &str) -> Result<UserSession, DispatchError>;

    /// End the session. The handle cannot be used afterwards.
    fn logout(&self, session: UserSession);

    fn account(&self, session: &UserSession) -> Result<UserAccount, DispatchError>;

    fn update_account(
        &mut self,
        session: &UserSession,
        update: AccountUpdate,
    ) -> Result<UserAccount, DispatchError>;

    fn add_contact(
        &mut self,
        session: &UserSession,
        name: &str,
        phone: &str,
    ) -> Result<EmergencyContact, DispatchError>;

    fn contacts(&self, session: &UserSession) -> Result<Vec<EmergencyContact>, DispatchError>;

    /// Delete one of the session user's contacts.
    fn delete_contact(&mut self, session: &UserSession, contact_id: u64)
    -> Result<(), DispatchError>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
struct StoreDocument {
    next_user_id: u64,
    next_contact_id: u64,
    users: Vec<UserAccount>,
    contacts: Vec<EmergencyContact>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            next_user_id: 1,
            next_contact_id: 1,
            users: Vec::new(),
            contacts: Vec::new(),
        }
    }
}

/// One JSON document on disk, loaded at open and rewritten atomically on every change.
pub struct FileBasedStore {
    file_path: PathBuf,
    document: StoreDocument,
}

impl FileBasedStore {
    /// Open the store kept in `storage_path`, creating the directory if needed.
    pub fn open(storage_path: &Path) -> Result<Self, DispatchError> {
        if !storage_path.exists() {
            fs::create_dir_all(storage_path).map_err(|e| DispatchError::StoreIO { source: e })?;
        }

        let file_path = storage_path.join(STORE_FILE_NAME);
        let document = if file_path.exists() {
            let content =
                fs::read_to_string(&file_path).map_err(|e| DispatchError::StoreIO { source: e })?;
            if content.trim().is_empty() {
                warn!("Profile store {:?} is empty, starting fresh", file_path);
                StoreDocument::default()
            } else {
                serde_json::from_str(&content)
                    .map_err(|e| DispatchError::StoreSerialize { source: e })?
            }
        } else {
            debug!("No profile store at {:?} yet", file_path);
            StoreDocument::default()
        };

        Ok(Self {
            file_path,
            document,
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Write the whole document to a temporary file, then rename it over the old one.
    fn persist(&self) -> Result<(), DispatchError> {
        let temp_path = self.file_path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(&self.document)
            .map_err(|e| DispatchError::StoreSerialize { source: e })?;

        {
            let mut temp_file =
                fs::File::create(&temp_path).map_err(|e| DispatchError::StoreOperation {
                    operation: "create_temp_file".to_string(),
                    reason: e.to_string(),
                })?;
            temp_file
                .write_all(content.as_bytes())
                .map_err(|e| DispatchError::StoreOperation {
                    operation: "write_temp_file".to_string(),
                    reason: e.to_string(),
                })?;
            temp_file
                .sync_all()
                .map_err(|e| DispatchError::StoreOperation {
                    operation: "sync_temp_file".to_string(),
                    reason: e.to_string(),
                })?;
        }

        fs::rename(&temp_path, &self.file_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            DispatchError::StoreOperation {
                operation: "rename_temp_file".to_string(),
                reason: e.to_string(),
            }
        })?;

        debug!("Profile store saved to {:?}", self.file_path);
        Ok(())
    }

    /// Apply `change` and persist it. The in-memory document is restored if saving fails.
    fn commit<R>(
        &mut self,
        change: impl FnOnce(&mut StoreDocument) -> Result<R, DispatchError>,
    ) -> Result<R, DispatchError> {
        let snapshot = self.document.clone();
        let result = change(&mut self.document)?;
        if let Err(e) = self.persist() {
            self.document = snapshot;
            return Err(e);
        }
        Ok(result)
    }

    fn user(&self, session: &UserSession) -> Result<&UserAccount, DispatchError> {
        self.document
            .users
            .iter()
            .find(|user| user.id == session.user_id())
            .ok_or(DispatchError::NotLoggedIn)
    }
}

impl ProfileStore for FileBasedStore {
    fn register(
        &mut self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<UserSession, DispatchError> {
        let email = validate_email(email)?;
        let mut account = UserAccount {
            id: self.document.next_user_id,
            email: email.clone(),
            password: String::new(),
            name: String::new(),
            phone: None,
            profile: MedicalProfile::default(),
        };
        AccountUpdate {
            name: Some(name.to_string()),
            password: Some(password.to_string()),
            ..Default::default()
        }
        .apply_to(&mut account)?;

        let session = self.commit(|document| {
            if document.users.iter().any(|user| user.email == email) {
                return Err(DispatchError::DuplicateEmail {
                    email: email.clone(),
                });
            }
            let session = UserSession::new(account.id, account.email.clone());
            document.next_user_id += 1;
            document.users.push(account);
            Ok(session)
        })?;

        info!("Registered user {}", session.user_id());
        Ok(session)
    }

    fn login(&self, email: &str, password: &str) -> Result<UserSession, DispatchError> {
        let email = email.trim().to_lowercase();
        let user = self
            .document
            .users
            .iter()
            .find(|user| user.email == email && user.password == password)
            .ok_or(DispatchError::InvalidCredentials)?;

        info!("User {} logged in", user.id);
        Ok(UserSession::new(user.id, user.email.clone()))
    }

    fn logout(&self, session: UserSession) {
        info!("User {} logged out", session.user_id());
    }

    fn account(&self, session: &UserSession) -> Result<UserAccount, DispatchError> {
        self.user(session).cloned()
    }

    fn update_account(
        &mut self,
        session: &UserSession,
        update: AccountUpdate,
    ) -> Result<UserAccount, DispatchError> {
        let mut account = self.user(session)?.clone();
        update.apply_to(&mut account)?;

        self.commit(|document| {
            if document
                .users
                .iter()
                .any(|user| user.id != account.id && user.email == account.email)
            {
                return Err(DispatchError::DuplicateEmail {
                    email: account.email.clone(),
                });
            }
            if let Some(user) = document.users.iter_mut().find(|user| user.id == account.id) {
                *user = account.clone();
            }
            Ok(account)
        })
    }

    fn add_contact(
        &mut self,
        session: &UserSession,
        name: &str,
        phone: &str,
    ) -> Result<EmergencyContact, DispatchError> {
        let user_id = self.user(session)?.id;
        let contact = EmergencyContact::new(self.document.next_contact_id, user_id, name, phone)?;

        self.commit(|document| {
            document.next_contact_id += 1;
            document.contacts.push(contact.clone());
            Ok(contact)
        })
    }

    fn contacts(&self, session: &UserSession) -> Result<Vec<EmergencyContact>, DispatchError> {
        let user_id = self.user(session)?.id;
        Ok(self
            .document
            .contacts
            .iter()
            .filter(|contact| contact.user_id == user_id)
            .cloned()
            .collect())
    }

    fn delete_contact(
        &mut self,
        session: &UserSession,
        contact_id: u64,
    ) -> Result<(), DispatchError> {
        let user_id = self.user(session)?.id;
        self.commit(|document| {
            let position = document
                .contacts
                .iter()
                .position(|contact| contact.id == contact_id && contact.user_id == user_id)
                .ok_or(DispatchError::ContactNotFound { id: contact_id })?;
            document.contacts.remove(position);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BloodType;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileBasedStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileBasedStore::open(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_register_logs_in() {
        let (_dir, mut store) = store();
        let session = store.register("Maria@gmail.com", "secret", "Maria").unwrap();
        assert_eq!(session.email(), "maria@gmail.com");

        let account = store.account(&session).unwrap();
        assert_eq!(account.name, "Maria");
        assert!(account.profile.is_incomplete());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (_dir, mut store) = store();
        store.register("maria@gmail.com", "secret", "Maria").unwrap();
        assert!(matches!(
            store.register("MARIA@gmail.com", "other", "Maria 2"),
            Err(DispatchError::DuplicateEmail { .. })
        ));
    }

    #[test]
    fn test_register_validates_input() {
        let (_dir, mut store) = store();
        assert!(store.register("maria@example.com", "secret", "Maria").is_err());
        assert!(store.register("maria@gmail.com", "", "Maria").is_err());
        assert!(store.register("maria@gmail.com", "secret", " ").is_err());
        assert!(!store.file_path().exists());
    }

    #[test]
    fn test_login() {
        let (_dir, mut store) = store();
        let registered = store.register("maria@gmail.com", "secret", "Maria").unwrap();
        let user_id = registered.user_id();
        store.logout(registered);

        let session = store.login("maria@gmail.com", "secret").unwrap();
        assert_eq!(session.user_id(), user_id);
        assert!(matches!(
            store.login("maria@gmail.com", "wrong"),
            Err(DispatchError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_update_account() {
        let (_dir, mut store) = store();
        let session = store.register("maria@gmail.com", "secret", "Maria").unwrap();

        let updated = store
            .update_account(
                &session,
                AccountUpdate {
                    blood_type: Some(BloodType::ONegative),
                    allergies: Some("Dipyrone".to_string()),
                    age: Some("34".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!updated.profile.is_incomplete());
        assert_eq!(store.account(&session).unwrap(), updated);
    }

    #[test]
    fn test_update_to_taken_email_rejected() {
        let (_dir, mut store) = store();
        store.register("joao@hotmail.com", "secret", "Joao").unwrap();
        let session = store.register("maria@gmail.com", "secret", "Maria").unwrap();

        let result = store.update_account(
            &session,
            AccountUpdate {
                email: Some("joao@hotmail.com".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(DispatchError::DuplicateEmail { .. })));
        assert_eq!(store.account(&session).unwrap().email, "maria@gmail.com");
    }

    #[test]
    fn test_contacts_are_scoped_to_user() {
        let (_dir, mut store) = store();
        let maria = store.register("maria@gmail.com", "secret", "Maria").unwrap();
        let joao = store.register("joao@hotmail.com", "secret", "Joao").unwrap();

        let contact = store.add_contact(&maria, "Ana", "13 97777-0000").unwrap();
        store.add_contact(&joao, "Pedro", "13 96666-0000").unwrap();

        assert_eq!(store.contacts(&maria).unwrap(), vec![contact.clone()]);
        assert!(matches!(
            store.delete_contact(&joao, contact.id),
            Err(DispatchError::ContactNotFound { .. })
        ));

        store.delete_contact(&maria, contact.id).unwrap();
        assert!(store.contacts(&maria).unwrap().is_empty());
        assert_eq!(store.contacts(&joao).unwrap().len(), 1);
    }

    #[test]
    fn test_contact_ids_are_not_reused() {
        let (_dir, mut store) = store();
        let session = store.register("maria@gmail.com", "secret", "Maria").unwrap();
        let first = store.add_contact(&session, "Ana", "1").unwrap();
        store.delete_contact(&session, first.id).unwrap();
        let second = store.add_contact(&session, "Ana", "1").unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_reopen_reads_saved_document() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = FileBasedStore::open(temp_dir.path()).unwrap();
            let session = store.register("maria@gmail.com", "secret", "Maria").unwrap();
            store.add_contact(&session, "Ana", "13 97777-0000").unwrap();
        }

        let store = FileBasedStore::open(temp_dir.path()).unwrap();
        let session = store.login("maria@gmail.com", "secret").unwrap();
        assert_eq!(store.contacts(&session).unwrap().len(), 1);
        assert!(!temp_dir.path().join("profiles.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(STORE_FILE_NAME), "{ broken").unwrap();
        assert!(matches!(
            FileBasedStore::open(temp_dir.path()),
            Err(DispatchError::StoreSerialize { .. })
        ));
    }
}
