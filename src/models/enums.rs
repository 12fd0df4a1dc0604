use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
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

str_enum!(FindingClass {
    Affected => "A",
    Carrier => "C",
    Inconclusive => "I",
    NotSignificant => "N",
});

impl FindingClass {
    /// Ordering used to pick the headline class of a review: A > C > I > N.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Affected => 3,
            Self::Carrier => 2,
            Self::Inconclusive => 1,
            Self::NotSignificant => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Affected => "Affected",
            Self::Carrier => "Carrier",
            Self::Inconclusive => "Inconclusive",
            Self::NotSignificant => "Not significant",
        }
    }
}

str_enum!(TemplateKind {
    Singleton => "singleton",
    Trio => "trio",
});

str_enum!(DuplicatePolicy {
    Skip => "skip",
    Update => "update",
    Fail => "fail",
});

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self::Skip
    }
}

str_enum!(ImportKind {
    PatientList => "patient_list",
    VariantReview => "variant_review",
});
