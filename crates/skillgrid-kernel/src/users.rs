//! Per-identity profiles. Created lazily on first write; the credential
//! blob is opaque ciphertext only attested workers can decrypt.

use skillgrid_core::limits::{MAX_ENCRYPTED_CREDENTIAL_HEX, MIN_ENCRYPTED_CREDENTIAL_HEX};
use skillgrid_core::{CoreError, Identity, Result, UserProfile};

use crate::Kernel;

fn validate_credential_blob(blob: &str) -> Result<()> {
    if blob.len() < MIN_ENCRYPTED_CREDENTIAL_HEX {
        return Err(CoreError::invalid("encrypted credential too short"));
    }
    if blob.len() > MAX_ENCRYPTED_CREDENTIAL_HEX {
        return Err(CoreError::invalid("encrypted credential too long"));
    }
    if !blob.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::invalid(
            "encrypted credential is not hex encoded",
        ));
    }
    Ok(())
}

impl Kernel {
    /// Store or replace the caller's encrypted credential, creating the
    /// profile if this is their first write.
    pub fn set_encrypted_credential(&self, caller: &Identity, blob: String) -> Result<()> {
        validate_credential_blob(&blob)?;
        let now = Self::now();
        let mut state = self.state();
        let profile = state
            .users
            .entry(caller.clone())
            .or_insert_with(|| UserProfile::new(caller.clone(), now));
        profile.encrypted_credential = Some(blob);
        profile.last_active = now;
        Ok(())
    }

    /// Delete the blob only; counters and the profile survive.
    pub fn remove_encrypted_credential(&self, caller: &Identity) -> Result<()> {
        let mut state = self.state();
        if let Some(profile) = state.users.get_mut(caller) {
            profile.encrypted_credential = None;
        }
        Ok(())
    }

    pub fn has_credential(&self, caller: &Identity) -> bool {
        self.state()
            .users
            .get(caller)
            .is_some_and(|p| p.encrypted_credential.is_some())
    }

    pub fn get_my_profile(&self, caller: &Identity) -> Option<UserProfile> {
        self.state().users.get(caller).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn blob() -> String {
        "ab".repeat(40)
    }

    #[test]
    fn lazy_create_then_remove_keeps_counters() {
        let (kernel, _dir) = testutil::kernel();
        let u = Identity::from("user-a");
        assert!(kernel.get_my_profile(&u).is_none());
        kernel.set_encrypted_credential(&u, blob()).unwrap();
        assert!(kernel.has_credential(&u));

        {
            let mut state = kernel.state();
            state.users.get_mut(&u).unwrap().analyses_performed = 3;
        }
        kernel.remove_encrypted_credential(&u).unwrap();
        assert!(!kernel.has_credential(&u));
        let profile = kernel.get_my_profile(&u).unwrap();
        assert_eq!(profile.analyses_performed, 3);
    }

    #[test]
    fn rejects_malformed_blobs() {
        let (kernel, _dir) = testutil::kernel();
        let u = Identity::from("user-a");
        for bad in ["", "abcd", &"zz".repeat(40), &"ab".repeat(3000)] {
            let err = kernel
                .set_encrypted_credential(&u, bad.to_string())
                .unwrap_err();
            assert!(matches!(err, CoreError::InvalidArgument(_)), "{bad:.8}");
        }
    }
}
