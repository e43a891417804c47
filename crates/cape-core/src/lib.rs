//! Label interning and composition engine for the cape policy store.
//!
//! Models hierarchical, set-based security labels: atomic tokens are
//! interned into stable ids, token-sets are content-addressed by a
//! canonical signature, named groups wrap one mutable shared set, and
//! levels compose a token-set with a set of groups. The effective
//! permission set of a level is the union of everything reachable from it.
//!
//! No I/O happens here; persistence and transport live in the
//! neighboring crates.

pub mod effective;
pub mod id;
pub mod model;
pub mod resource;
pub mod signature;

pub use effective::effective_set;
pub use id::{GroupId, LevelId, ObjectId, TokenId, TokenSetId};
pub use model::{SecurityGroup, SecurityLevel, SecurityObject, Token, TokenSet};
pub use resource::{GroupResource, LevelResource, ObjectResource};
pub use signature::signature_of;
