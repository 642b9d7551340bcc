use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde uses the same string as the database column.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(RepeatKind {
    Daily => "daily",
    Weekly => "weekly",
    Monthly => "monthly",
    Course => "course",
    Custom => "custom",
});

str_enum!(MealLabel {
    BeforeMeal => "before_meal",
    AfterMeal => "after_meal",
    WithMeal => "with_meal",
    NoMeal => "no_meal",
});

str_enum!(RecordStatus {
    Scheduled => "scheduled",
    Taken => "taken",
    Missed => "missed",
    Skipped => "skipped",
});

str_enum!(ReminderStage {
    TenMinutesBefore => "10min",
    OnTime => "on-time",
    FiveMinutesLate => "5min-late",
    Missed => "missed",
});

impl MealLabel {
    /// Short phrase appended to reminder bodies.
    pub fn phrase(&self) -> &'static str {
        match self {
            Self::BeforeMeal => "before meal",
            Self::AfterMeal => "after meal",
            Self::WithMeal => "with meal",
            Self::NoMeal => "regardless of meals",
        }
    }
}

impl RecordStatus {
    /// Taken and skipped are user decisions and never revert.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Taken | Self::Skipped)
    }
}
