//! Macro for implementing Display and FromStr for status enums
//!
//! Every persisted status column stores the lower snake-case name produced
//! here, so the same strings appear in SQLite, JSON output and audit entries.
//!
//! # Example
//!
//! ```rust
//! use partsource_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum DeliveryStatus {
//!     Pending,
//!     InTransit,
//! }
//!
//! impl_domain_status_conversions!(DeliveryStatus {
//!     Pending => "pending",
//!     InTransit => "in_transit",
//! });
//!
//! assert_eq!(DeliveryStatus::InTransit.as_str(), "in_transit");
//! assert_eq!("IN_TRANSIT".parse::<DeliveryStatus>(), Ok(DeliveryStatus::InTransit));
//! ```

/// Implements `as_str`, Display and FromStr for status enums
///
/// Parsing is case-insensitive; output is always the mapped string.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $enum_name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$enum_name] = &[$($enum_name::$variant),+];

            /// Canonical string stored in persistence and emitted in events
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
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

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum LaneStatus {
        Open,
        OnHold,
        Closed,
    }

    impl_domain_status_conversions!(LaneStatus {
        Open => "open",
        OnHold => "on_hold",
        Closed => "closed",
    });

    #[test]
    fn display_uses_mapped_string() {
        assert_eq!(LaneStatus::OnHold.to_string(), "on_hold");
        assert_eq!(LaneStatus::Closed.as_str(), "closed");
    }

    #[test]
    fn parsing_is_case_insensitive() {
        assert_eq!(LaneStatus::from_str("ON_HOLD").unwrap(), LaneStatus::OnHold);
        assert_eq!(LaneStatus::from_str("Open").unwrap(), LaneStatus::Open);
    }

    #[test]
    fn unknown_value_names_the_enum() {
        let err = LaneStatus::from_str("archived").unwrap_err();
        assert!(err.contains("Invalid LaneStatus: archived"));
    }

    #[test]
    fn all_lists_every_variant_in_order() {
        assert_eq!(LaneStatus::ALL, &[LaneStatus::Open, LaneStatus::OnHold, LaneStatus::Closed]);
        for status in LaneStatus::ALL {
            assert_eq!(LaneStatus::from_str(status.as_str()).unwrap(), *status);
        }
    }

    mod with_domain_result_in_scope {
        use std::str::FromStr;

        #[allow(unused_imports)]
        use crate::Result;

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum DockStatus {
            Idle,
            Loading,
        }

        impl_domain_status_conversions!(DockStatus {
            Idle => "idle",
            Loading => "loading",
        });

        #[test]
        fn expands_next_to_the_crate_result_alias() {
            assert_eq!(DockStatus::from_str("LOADING").unwrap(), DockStatus::Loading);
            assert!(DockStatus::from_str("gone").is_err());
            assert_eq!(DockStatus::Idle.to_string(), "idle");
        }
    }
}
