//! Persistence of connections, scoped to local users.
//!
//! [`UsersConnectionRepository`] owns the SQLite store and answers questions
//! that span users ("which local user owns this remote account?").
//! [`ConnectionRepository`] is the view of a single local user, handed out by
//! [`UsersConnectionRepository::scope_to_user`].
//!
//! Stored rows are turned back into live connections through the
//! [`ConnectionFactoryRegistry`](crate::connect::ConnectionFactoryRegistry),
//! so every provider present in the store must be registered.

mod storage;

#[cfg(test)]
mod tests;

pub use storage::{ConnectionRepository, UsersConnectionRepository};
