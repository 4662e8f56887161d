/// Macro to implement conversions and `Display` for newtype wrappers around `String`.
///
/// Generates `From<&str>`, `From<String>`, `Display`, `Borrow<str>` and an `as_str` accessor.
#[macro_export]
macro_rules! impl_string_newtype {
    ($wrapper:ident) => {
        impl From<&str> for $wrapper {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $wrapper {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<$wrapper> for String {
            fn from(wrapper: $wrapper) -> Self {
                wrapper.0
            }
        }

        impl std::fmt::Display for $wrapper {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::borrow::Borrow<str> for $wrapper {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl $wrapper {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Macro to implement the unwrapping `From` conversion for validated newtypes around primitives.
///
/// Construction goes through a checked `new` on the wrapper.
#[macro_export]
macro_rules! impl_from_primitive {
    ($wrapper:ident, $primitive:ty) => {
        impl From<$wrapper> for $primitive {
            fn from(wrapper: $wrapper) -> Self {
                wrapper.0
            }
        }
    };
}

/// Macro to give a `strum` column enum its polars name conversions.
///
/// The enum must derive `IntoStaticStr`.
#[macro_export]
macro_rules! impl_col_name {
    ($col:ident) => {
        impl From<$col> for polars::prelude::PlSmallStr {
            fn from(value: $col) -> Self {
                value.as_str().into()
            }
        }

        impl $col {
            pub fn name(&self) -> polars::prelude::PlSmallStr {
                (*self).into()
            }

            pub fn as_str(&self) -> &'static str {
                self.into()
            }
        }
    };
}
