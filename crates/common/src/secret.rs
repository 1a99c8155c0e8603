//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for connection strings and other
//! credentials that flow through configuration. `Debug` on a struct holding a
//! [`SecretString`] prints a redacted placeholder, so deriving `Debug` on
//! config structs stays safe.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct StoreSettings {
//!     url: SecretString,
//! }
//!
//! let settings = StoreSettings {
//!     url: SecretString::from("redis://:hunter2@cache:6379"),
//! };
//!
//! assert!(!format!("{settings:?}").contains("hunter2"));
//! assert!(settings.url.expose_secret().starts_with("redis://"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("redis://:hunter2@localhost");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("redis://localhost:6379");
        assert_eq!(secret.expose_secret(), "redis://localhost:6379");
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
