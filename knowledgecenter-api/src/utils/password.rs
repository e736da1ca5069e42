use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use subtle::ConstantTimeEq;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash (PHC string form)
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id cost parameters used for new hashes.
///
/// Existing hashes always verify with the parameters encoded in them, so
/// these can be raised without invalidating stored passwords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argon2Settings {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub output_len: usize,
}

impl Default for Argon2Settings {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 1,
            parallelism: 4,
            output_len: 32,
        }
    }
}

impl Argon2Settings {
    pub(crate) fn params(&self) -> Result<Params, anyhow::Error> {
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.output_len),
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))
    }
}

/// Hash a password using Argon2id
///
/// A fresh 16-byte salt is drawn from the OS RNG. The result is
/// `$argon2id$v=19$m=<mem>,t=<time>,p=<lanes>$<salt>$<hash>` with unpadded
/// standard base64.
pub fn hash_password(
    password: &Password,
    settings: &Argon2Settings,
) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, settings.params()?);
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash
///
/// Recomputes the digest with the algorithm, version and cost parameters
/// parsed from the stored string and compares in constant time. Any
/// malformed input verifies as `false`.
pub fn verify_password(password: &Password, password_hash: &PasswordHashString) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash.as_str()) else {
        return false;
    };
    let Ok(algorithm) = Algorithm::try_from(parsed.algorithm) else {
        return false;
    };
    let version = match parsed.version.map(Version::try_from) {
        None => Version::default(),
        Some(Ok(version)) => version,
        Some(Err(_)) => return false,
    };
    let Ok(params) = Params::try_from(&parsed) else {
        return false;
    };
    let (Some(salt), Some(expected)) = (parsed.salt, parsed.hash) else {
        return false;
    };

    let mut salt_buf = [0u8; 64];
    let Ok(salt) = salt.decode_b64(&mut salt_buf) else {
        return false;
    };

    let mut computed = vec![0u8; expected.len()];
    if Argon2::new(algorithm, version, params)
        .hash_password_into(password.as_str().as_bytes(), salt, &mut computed)
        .is_err()
    {
        return false;
    }

    computed.as_slice().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> Argon2Settings {
        Argon2Settings {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
            output_len: 32,
        }
    }

    #[test]
    fn test_hash_password_format() {
        let password = Password::new("passw0rd!".to_string());
        let hash = hash_password(&password, &Argon2Settings::default()).expect("hash");

        assert!(hash.as_str().starts_with("$argon2id$v=19$m=65536,t=1,p=4$"));
        let parts: Vec<&str> = hash.as_str().split('$').collect();
        assert_eq!(parts.len(), 6);
        // 16-byte salt and 32-byte digest, unpadded base64
        assert_eq!(parts[4].len(), 22);
        assert_eq!(parts[5].len(), 43);
        assert!(!parts[4].contains('=') && !parts[5].contains('='));
    }

    #[test]
    fn test_verify_password_correct() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password, &light()).expect("hash");
        assert!(verify_password(&password, &hash));
    }

    #[test]
    fn test_verify_password_incorrect() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash = hash_password(&password, &light()).expect("hash");

        for wrong in ["mySecurePassword124", "", "mySecurePassword1234", "MySecurePassword123"] {
            assert!(!verify_password(&Password::new(wrong.to_string()), &hash));
        }
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("mySecurePassword123".to_string());
        let hash1 = hash_password(&password, &light()).expect("hash");
        let hash2 = hash_password(&password, &light()).expect("hash");

        assert_ne!(hash1.as_str(), hash2.as_str());
        assert!(verify_password(&password, &hash1));
        assert!(verify_password(&password, &hash2));
    }

    #[test]
    fn test_verify_uses_parameters_from_hash() {
        let password = Password::new("rotate-me-please".to_string());
        let old = hash_password(&password, &light()).expect("hash");

        // Parameters moved on; the stored hash still carries its own.
        let newer = Argon2Settings {
            memory_kib: 512,
            iterations: 2,
            ..light()
        };
        let new = hash_password(&password, &newer).expect("hash");

        assert!(old.as_str().contains("m=256,t=1,p=1"));
        assert!(new.as_str().contains("m=512,t=2,p=1"));
        assert!(verify_password(&password, &old));
        assert!(verify_password(&password, &new));
    }

    #[test]
    fn test_malformed_hashes_are_invalid() {
        let password = Password::new("whatever1".to_string());
        for bad in [
            "",
            "plaintext",
            "$argon2id$v=19$m=256,t=1,p=1$",
            "$argon2id$v=19$m=256,t=1,p=1$c2FsdHNhbHRzYWx0$",
            "$bcrypt$v=19$m=256,t=1,p=1$c2FsdHNhbHRzYWx0$aGFzaGhhc2hoYXNoaGFzaA",
            "$argon2id$v=99$m=256,t=1,p=1$c2FsdHNhbHRzYWx0$aGFzaGhhc2hoYXNoaGFzaA",
        ] {
            assert!(!verify_password(
                &password,
                &PasswordHashString::new(bad.to_string())
            ));
        }
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::new("hunter22".to_string());
        assert!(!format!("{:?}", password).contains("hunter22"));
    }
}
