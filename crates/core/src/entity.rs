//! Records with a stable identity.

use std::fmt::Display;

/// Something the shop keeps a record of, identified for its whole lifetime.
///
/// The identifier never changes once assigned; the name and any counts may.
pub trait Entity {
    type Id: Clone + Ord + Display;

    fn id(&self) -> &Self::Id;

    fn name(&self) -> &str;

    /// Label used by pickers and the change feed: `"{id} - {name}"`.
    fn label(&self) -> String {
        format!("{} - {}", self.id(), self.name())
    }
}
