//! Credential fact sets describing a process identity
//!
//! A credential set carries zero or more facts about a process (unix
//! uid, pid, group ids, LSM security label, audit session data). The
//! empty set asserts nothing and doubles as the anonymous identity.

use crate::{BusError, Result};

/// Facts about a process identity. Empty asserts nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    unix_uid: Option<u32>,
    pid: Option<u32>,
    unix_gids: Option<Vec<u32>>,
    linux_security_label: Option<String>,
    adt_audit_data: Option<Vec<u8>>,
}

impl Credentials {
    /// The empty credential set
    pub fn new() -> Self {
        Self::default()
    }

    /// Facts about the calling process: effective uid and pid
    pub fn of_current_process() -> Self {
        // SAFETY: geteuid and getpid have no failure modes
        let uid = unsafe { libc::geteuid() } as u32;
        let pid = unsafe { libc::getpid() } as u32;
        Credentials {
            unix_uid: Some(uid),
            pid: Some(pid),
            ..Default::default()
        }
    }

    /// A set carrying only a unix uid
    pub fn for_uid(uid: u32) -> Self {
        Credentials {
            unix_uid: Some(uid),
            ..Default::default()
        }
    }

    /// Parse the decimal-uid wire form used by identity assertions
    pub fn from_uid_text(text: &str) -> Result<Self> {
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BusError::MalformedCredential(format!(
                "not a uid: '{}'",
                text.escape_default()
            )));
        }
        let uid = text.parse::<u32>().map_err(|_| {
            BusError::MalformedCredential(format!("uid out of range: '{}'", text))
        })?;
        Ok(Self::for_uid(uid))
    }

    /// Get the unix uid fact, if present
    pub fn unix_uid(&self) -> Option<u32> {
        self.unix_uid
    }

    /// Get the pid fact, if present
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Get the group-id fact, if present (sorted ascending)
    pub fn unix_gids(&self) -> Option<&[u32]> {
        self.unix_gids.as_deref()
    }

    /// Get the LSM security label fact, if present
    pub fn linux_security_label(&self) -> Option<&str> {
        self.linux_security_label.as_deref()
    }

    /// Get the opaque audit session fact, if present
    pub fn adt_audit_data(&self) -> Option<&[u8]> {
        self.adt_audit_data.as_deref()
    }

    /// Set the unix uid fact
    pub fn set_unix_uid(&mut self, uid: u32) {
        self.unix_uid = Some(uid);
    }

    /// Set the pid fact
    pub fn set_pid(&mut self, pid: u32) {
        self.pid = Some(pid);
    }

    /// Set the group-id fact; the list is kept sorted
    pub fn set_unix_gids(&mut self, mut gids: Vec<u32>) {
        gids.sort_unstable();
        self.unix_gids = Some(gids);
    }

    /// Set the LSM security label fact
    pub fn set_linux_security_label(&mut self, label: String) {
        self.linux_security_label = Some(label);
    }

    /// Set the opaque audit session fact
    pub fn set_adt_audit_data(&mut self, data: Vec<u8>) {
        self.adt_audit_data = Some(data);
    }

    /// True when the set carries no user fact at all
    pub fn is_anonymous(&self) -> bool {
        self.unix_uid.is_none()
    }

    /// True when both sets carry the same unix uid
    pub fn same_user(&self, other: &Credentials) -> bool {
        self.unix_uid.is_some() && self.unix_uid == other.unix_uid
    }

    /// True when every fact in `other` is present here with the same value
    pub fn is_superset_of(&self, other: &Credentials) -> bool {
        if let Some(uid) = other.unix_uid {
            if self.unix_uid != Some(uid) {
                return false;
            }
        }
        if let Some(pid) = other.pid {
            if self.pid != Some(pid) {
                return false;
            }
        }
        if let Some(gids) = &other.unix_gids {
            if self.unix_gids.as_ref() != Some(gids) {
                return false;
            }
        }
        if let Some(label) = &other.linux_security_label {
            if self.linux_security_label.as_deref() != Some(label.as_str()) {
                return false;
            }
        }
        if let Some(audit) = &other.adt_audit_data {
            if self.adt_audit_data.as_ref() != Some(audit) {
                return false;
            }
        }
        true
    }

    /// Copy every fact present in `other` into this set
    pub fn merge(&mut self, other: &Credentials) {
        if let Some(uid) = other.unix_uid {
            self.unix_uid = Some(uid);
        }
        if let Some(pid) = other.pid {
            self.pid = Some(pid);
        }
        if let Some(gids) = &other.unix_gids {
            self.unix_gids = Some(gids.clone());
        }
        if let Some(label) = &other.linux_security_label {
            self.linux_security_label = Some(label.clone());
        }
        if let Some(audit) = &other.adt_audit_data {
            self.adt_audit_data = Some(audit.clone());
        }
    }

    /// Drop every fact
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_is_anonymous() {
        let creds = Credentials::new();
        assert!(creds.is_anonymous());
        assert_eq!(creds.unix_uid(), None);
    }

    #[test]
    fn test_current_process_has_uid_and_pid() {
        let creds = Credentials::of_current_process();
        assert!(creds.unix_uid().is_some());
        assert!(creds.pid().is_some());
        assert!(!creds.is_anonymous());
    }

    #[test]
    fn test_uid_text_parsing() {
        assert_eq!(
            Credentials::from_uid_text("1000").unwrap().unix_uid(),
            Some(1000)
        );
        assert_eq!(Credentials::from_uid_text("0").unwrap().unix_uid(), Some(0));

        assert!(Credentials::from_uid_text("").is_err());
        assert!(Credentials::from_uid_text("-1").is_err());
        assert!(Credentials::from_uid_text("+1").is_err());
        assert!(Credentials::from_uid_text("12 34").is_err());
        assert!(Credentials::from_uid_text("root").is_err());
        assert!(Credentials::from_uid_text("99999999999999999999").is_err());
    }

    #[test]
    fn test_same_user() {
        let a = Credentials::for_uid(1000);
        let b = Credentials::for_uid(1000);
        let c = Credentials::for_uid(0);
        assert!(a.same_user(&b));
        assert!(!a.same_user(&c));
        assert!(!Credentials::new().same_user(&Credentials::new()));
    }

    #[test]
    fn test_superset() {
        let mut rich = Credentials::for_uid(1000);
        rich.set_pid(4242);

        let uid_only = Credentials::for_uid(1000);
        assert!(rich.is_superset_of(&uid_only));
        assert!(!uid_only.is_superset_of(&rich));

        // Everything is a superset of the empty set
        assert!(rich.is_superset_of(&Credentials::new()));
        assert!(Credentials::new().is_superset_of(&Credentials::new()));

        let other_uid = Credentials::for_uid(0);
        assert!(!rich.is_superset_of(&other_uid));
    }

    #[test]
    fn test_merge_overwrites_and_fills() {
        let mut target = Credentials::for_uid(1000);
        let mut extra = Credentials::new();
        extra.set_pid(77);
        extra.set_linux_security_label("system_u:system_r:init_t".to_string());
        extra.set_adt_audit_data(vec![1, 2, 3]);

        target.merge(&extra);
        assert_eq!(target.unix_uid(), Some(1000));
        assert_eq!(target.pid(), Some(77));
        assert_eq!(
            target.linux_security_label(),
            Some("system_u:system_r:init_t")
        );
        assert_eq!(target.adt_audit_data(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_clear() {
        let mut creds = Credentials::of_current_process();
        creds.clear();
        assert_eq!(creds, Credentials::new());
    }
}
