//! Macro for implementing Display and FromStr for string-backed enums
//!
//! Provider kinds and sync states are persisted as lowercase strings. This
//! macro keeps the textual mapping in one place.
//!
//! # Example
//!
//! ```rust
//! use busysync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Direction {
//!     Push,
//!     Pull,
//! }
//!
//! impl_domain_status_conversions!(Direction {
//!     Push => "push",
//!     Pull => "pull",
//! });
//!
//! assert_eq!(Direction::Push.to_string(), "push");
//! assert_eq!("PULL".parse::<Direction>(), Ok(Direction::Pull));
//! ```

/// Implements Display and FromStr traits for string-backed enums
///
/// Parsing is case-insensitive; output is always the canonical lowercase
/// string given in the mapping.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Canonical string form.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
