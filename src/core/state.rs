//! Identifier trait for states and events.
//!
//! Machines never own user state values; they own a tree of nodes keyed by
//! opaque identifiers. Anything cheap to clone and totally ordered can serve
//! as a state or event identifier.

use std::fmt::Debug;

/// Trait for state and event identifiers.
///
/// Blanket-implemented for every type meeting the bounds, so enums, integers
/// and strings work out of the box.
///
/// # Required Traits
///
/// - `Clone`: identifiers are copied into event contexts and notifications
/// - `Ord`: the state registry and transition tables are ordered maps
/// - `Debug`: identifiers appear in logs and error messages
/// - `Send` + `Sync`: active machines move identifiers across threads
///
/// # Example
///
/// ```rust
/// use statecraft::core::Identifier;
///
/// #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
/// enum Door {
///     Open,
///     Closed,
/// }
///
/// fn accepts<I: Identifier>(_: I) {}
///
/// accepts(Door::Open);
/// accepts("closed");
/// accepts(42u16);
/// ```
pub trait Identifier: Clone + Ord + Debug + Send + Sync + 'static {}

impl<T> Identifier for T where T: Clone + Ord + Debug + Send + Sync + 'static {}
