/// Storage collaborators for the file service
///
/// - `users`: account directory consulted by Login
/// - `files`: file metadata index and on-disk content
pub mod files;
pub mod users;

pub use files::{ContentReader, DiskFileStore, FileDraft, FileRecord, FileStore, Owner};
pub use users::{default_seeds, seed_users, InMemoryUserStore, User, UserSeed, UserStore};
