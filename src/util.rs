//! Unique name helpers for fixture accounts, passwords and labels

use uuid::Uuid;

/// Suffix appended by [`test_string`] so UI tests exercise non-ASCII text
pub const I18N_SUFFIX: &str = "-Iñtërnâtiônàlizætiøn";

/// A short unique token
pub fn uniq() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// A unique page/user title starting with `prefix`
pub fn title(prefix: &str) -> String {
    format!("{prefix}{}", uniq())
}

/// A unique test string: `prefix`, a random number, then [`I18N_SUFFIX`]
pub fn test_string(prefix: &str) -> String {
    let random = Uuid::new_v4().as_u128() % 10_u128.pow(16);
    format!("{prefix}0.{random:016}{I18N_SUFFIX}")
}
