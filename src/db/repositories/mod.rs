//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles CRUD operations for a specific entity.

pub mod category;
pub mod comment;
pub mod master;
pub mod order;
pub mod post;
pub mod review;
pub mod service;
pub mod session;
pub mod tag;
pub mod user;

pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, CommentRepositoryImpl, NewComment};
pub use master::{MasterRepository, SqlxMasterRepository};
pub use order::{OrderRepository, SqlxOrderRepository};
pub use post::{PostFilter, PostRepository, SqlxPostRepository};
pub use review::{ReviewRepository, SqlxReviewRepository};
pub use service::{ServiceRepository, SqlxServiceRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
