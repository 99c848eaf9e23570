//! Macros for ergonomic state machine construction.

/// Declare a fieldless enum usable as a state or event identifier.
///
/// Derives the ordering and hashing traits identifiers need, serde support,
/// and a `Display` that prints the variant name.
///
/// # Example
///
/// ```
/// use statecraft::identifier_enum;
///
/// identifier_enum! {
///     pub enum Light {
///         Red,
///         Green,
///         Yellow,
///     }
/// }
///
/// assert_eq!(Light::Green.to_string(), "Green");
/// assert!(Light::Red < Light::Yellow);
/// ```
#[macro_export]
macro_rules! identifier_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Debug,
            serde::Serialize,
            serde::Deserialize
        )]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => stringify!($variant)),*
                })
            }
        }
    };
}
