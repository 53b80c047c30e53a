//! Account directory
//!
//! The authoritative username index plus the nickname uniqueness index.
//! Owned exclusively by the server actor, so nothing here is synchronised.
//!
//! Invariant: every registered account has exactly one nickname entry under
//! its current nickname, and every nickname entry points at a registered
//! account.

use std::collections::HashMap;

use crate::account::Account;
use crate::error::AppError;

#[derive(Debug, Default)]
pub struct Directory {
    /// username -> account
    accounts: HashMap<String, Account>,
    /// nickname -> username
    nicknames: HashMap<String, String>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.accounts.contains_key(username)
    }

    pub fn get(&self, username: &str) -> Option<&Account> {
        self.accounts.get(username)
    }

    pub fn get_mut(&mut self, username: &str) -> Option<&mut Account> {
        self.accounts.get_mut(username)
    }

    /// Username currently holding `nickname`
    pub fn owner_of(&self, nickname: &str) -> Option<&str> {
        self.nicknames.get(nickname).map(String::as_str)
    }

    /// Insert a new account into both indices
    pub fn register(&mut self, account: Account) -> Result<&mut Account, AppError> {
        if self.contains(&account.username) {
            return Err(AppError::UsernameTaken(account.username));
        }
        if self.nickname_taken(&account.nickname) {
            return Err(AppError::NicknameTaken(account.nickname));
        }

        let username = account.username.clone();
        self.nicknames
            .insert(account.nickname.clone(), username.clone());
        Ok(self.accounts.entry(username).or_insert(account))
    }

    /// Whether any account uses `nickname`
    ///
    /// Checks the display nicknames and the index; either one is enough to
    /// refuse the name.
    pub fn nickname_taken(&self, nickname: &str) -> bool {
        self.accounts.values().any(|a| a.nickname == nickname)
            || self.nicknames.contains_key(nickname)
    }

    /// Drop a nickname index entry
    pub fn remove_nickname(&mut self, nickname: &str) -> Option<String> {
        self.nicknames.remove(nickname)
    }

    /// Point a nickname index entry at `username`
    pub fn update_nickname(&mut self, nickname: &str, username: &str) {
        self.nicknames
            .insert(nickname.to_string(), username.to_string());
    }

    /// Rename an account, returning its previous nickname
    ///
    /// Order matters: remove the old index entry, mutate the account, then
    /// insert the new entry. Renaming to the current nickname is a no-op.
    pub fn rename(&mut self, username: &str, nickname: &str) -> Result<String, AppError> {
        let current = match self.accounts.get(username) {
            Some(account) => account.nickname.clone(),
            None => return Err(AppError::UserNotFound(username.to_string())),
        };
        if current == nickname {
            return Ok(current);
        }
        if self.nickname_taken(nickname) {
            return Err(AppError::NicknameTaken(nickname.to_string()));
        }

        self.remove_nickname(&current);
        if let Some(account) = self.accounts.get_mut(username) {
            account.nickname = nickname.to_string();
        }
        self.update_nickname(nickname, username);
        Ok(current)
    }

    /// Registered usernames, sorted
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.accounts.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn len(&self) -> usize {
        self.accounts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory_with(accounts: &[(&str, &str)]) -> Directory {
        let mut directory = Directory::new();
        for (username, nickname) in accounts {
            directory
                .register(Account::new(*username, *nickname, "pw"))
                .unwrap();
        }
        directory
    }

    /// Both indices agree on every account
    fn assert_consistent(directory: &Directory) {
        assert_eq!(directory.accounts.len(), directory.nicknames.len());
        for account in directory.accounts.values() {
            assert_eq!(
                directory.owner_of(&account.nickname),
                Some(account.username.as_str())
            );
        }
    }

    #[test]
    fn test_register() {
        let directory = directory_with(&[("alice", "ally"), ("bob", "bobby")]);

        assert_eq!(directory.len(), 2);
        assert!(directory.contains("alice"));
        assert_eq!(directory.owner_of("bobby"), Some("bob"));
        assert_eq!(directory.usernames(), vec!["alice", "bob"]);
        assert_consistent(&directory);
    }

    #[test]
    fn test_register_conflicts() {
        let mut directory = directory_with(&[("alice", "ally")]);

        assert!(matches!(
            directory.register(Account::new("alice", "other", "pw")),
            Err(AppError::UsernameTaken(_))
        ));
        assert!(matches!(
            directory.register(Account::new("carol", "ally", "pw")),
            Err(AppError::NicknameTaken(_))
        ));
        assert_eq!(directory.len(), 1);
        assert_consistent(&directory);
    }

    #[test]
    fn test_rename() {
        let mut directory = directory_with(&[("alice", "ally")]);

        let old = directory.rename("alice", "al").unwrap();
        assert_eq!(old, "ally");
        assert_eq!(directory.get("alice").unwrap().nickname, "al");
        assert_eq!(directory.owner_of("al"), Some("alice"));
        assert!(directory.owner_of("ally").is_none());
        assert!(!directory.nickname_taken("ally"));
        assert_consistent(&directory);
    }

    #[test]
    fn test_rename_taken() {
        let mut directory = directory_with(&[("alice", "ally"), ("bob", "bob2")]);

        let err = directory.rename("alice", "bob2").unwrap_err();
        assert!(matches!(err, AppError::NicknameTaken(ref n) if n == "bob2"));
        assert_eq!(directory.get("alice").unwrap().nickname, "ally");
        assert_consistent(&directory);
    }

    #[test]
    fn test_rename_to_same_nickname() {
        let mut directory = directory_with(&[("alice", "ally")]);

        assert_eq!(directory.rename("alice", "ally").unwrap(), "ally");
        assert_consistent(&directory);
    }

    #[test]
    fn test_rename_unknown_user() {
        let mut directory = Directory::new();
        assert!(matches!(
            directory.rename("ghost", "boo"),
            Err(AppError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_nickname_uniqueness_after_renames() {
        let mut directory = directory_with(&[("a", "x"), ("b", "y"), ("c", "z")]);

        let _ = directory.rename("a", "y");
        let _ = directory.rename("b", "w");
        let _ = directory.rename("a", "y");
        let _ = directory.rename("c", "w");

        let mut nicknames: Vec<&str> = directory
            .accounts
            .values()
            .map(|a| a.nickname.as_str())
            .collect();
        nicknames.sort();
        nicknames.dedup();
        assert_eq!(nicknames.len(), 3);
        assert_eq!(directory.get("a").unwrap().nickname, "y");
        assert_eq!(directory.get("c").unwrap().nickname, "z");
        assert_consistent(&directory);
    }
}
