//! Declarative macros for the ordo crates.

/// Generates string conversions for a fieldless enum.
///
/// # Example
///
/// ```
/// #[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// enum Lane {
///     Fast,
///     Slow,
/// }
///
/// ordo_macros::enum_str! {
///     impl Lane {
///         pub fn as_str(&self) -> &'static str;
///         pub fn parse_str(raw: &str) -> Option<Self>;
///         variants {
///             Fast => ["fast", "f"],
///             Slow => ["slow"],
///         }
///     }
/// }
///
/// assert_eq!(Lane::Fast.as_str(), "fast");
/// assert_eq!(Lane::parse_str("f"), Some(Lane::Fast));
/// assert_eq!(Lane::ALL, &[Lane::Fast, Lane::Slow]);
/// assert_eq!(Lane::Slow.to_string(), "slow");
/// ```
///
/// Expands to:
/// - `as_str(&self)`: the first name listed for the variant
/// - `parse_str(&str)`: accepts the first name or any alias
/// - `ALL`: every variant in declaration order
/// - a `Display` impl that writes `as_str()`
#[macro_export]
macro_rules! enum_str {
    (
        impl $name:ident {
            $as_vis:vis fn as_str(&self) -> &'static str;
            $parse_vis:vis fn parse_str($raw:ident : &str) -> Option<Self>;
            variants {
                $($variant:ident => [$first:expr $(, $alias:expr)*]),+ $(,)?
            }
        }
    ) => {
        impl $name {
            /// Every variant, in declaration order.
            #[allow(dead_code)]
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            $as_vis fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $first,)+
                }
            }

            #[allow(dead_code)]
            $parse_vis fn parse_str($raw: &str) -> Option<Self> {
                match $raw {
                    $($first $(| $alias)* => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
