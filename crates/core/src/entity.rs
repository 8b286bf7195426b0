/// A record whose identity is its id, not its field values.
///
/// Clients and providers are entities: two profiles with identical fields but
/// different ids are different records.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
