//! Storage models shared by the repositories and the layers above them

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

/// Declares a closed set of values stored as TEXT, with a stable code, a
/// display label and conversions for serde and rusqlite.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $variant:ident => ($code:literal, $label:literal) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
        pub enum $name {
            $( #[serde(rename = $code)] $variant ),+
        }

        impl $name {
            /// Every value in display order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stored code
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            /// Human readable label
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}

pub mod appointment;
pub mod branch;
pub mod medication;
pub mod owner;
pub mod patient;
pub mod product;
pub mod record;
pub mod user;
pub mod vaccine;

pub use appointment::*;
pub use branch::*;
pub use medication::*;
pub use owner::*;
pub use patient::*;
pub use product::*;
pub use record::*;
pub use user::*;
pub use vaccine::*;

/// Which branches a query may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchScope {
    /// Every branch
    All,
    /// A single branch
    Branch(i64),
    /// No branch at all
    Nothing,
}

/// Current time truncated to whole seconds, the precision rows are stored with
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Format a timestamp the way it is stored: RFC 3339, UTC, second precision
pub fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn parse_db_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_db_timestamp(idx, &raw)
}

pub(crate) fn optional_timestamp_at(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_db_timestamp(idx, &raw).map(Some),
        None => Ok(None),
    }
}

/// "First Last", falling back to the username when both names are blank
pub fn display_name(first_name: &str, last_name: &str, username: &str) -> String {
    let full = format!("{} {}", first_name.trim(), last_name.trim());
    let full = full.trim();
    if full.is_empty() {
        username.to_string()
    } else {
        full.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format_round_trips_through_parse() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let stored = to_db_timestamp(&ts);
        assert_eq!(stored, "2024-03-09T14:05:00Z");
        assert_eq!(parse_db_timestamp(0, &stored).unwrap(), ts);
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        assert_eq!(display_name("Ana", "Paz", "apaz"), "Ana Paz");
        assert_eq!(display_name(" ", "", "apaz"), "apaz");
        assert_eq!(display_name("Ana", "", "apaz"), "Ana");
    }

    #[test]
    fn test_text_enum_codes() {
        assert_eq!(Role::AdminOp.as_str(), "ADMIN_OP");
        assert_eq!("attended".parse::<AppointmentStatus>().unwrap(), AppointmentStatus::Attended);
        assert!("unknown".parse::<ProductCategory>().is_err());
        assert_eq!(MedicationCategory::ALL.len(), 16);
    }
}
