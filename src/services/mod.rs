//! Services layer - Business logic
//!
//! Services validate form input, apply the shop's rules and coordinate
//! repositories, the cache and the outbound integrations (moderation and
//! Telegram notifications).

pub mod blog;
pub mod catalog;
pub mod comment;
pub mod form;
pub mod markdown;
pub mod master;
pub mod moderation;
pub mod notifier;
pub mod order;
pub mod password;
pub mod rate_limiter;
pub mod review;
pub mod slug;
pub mod upload;
pub mod user;
pub mod visitor;

pub use blog::{BlogError, BlogService, PostCard};
pub use catalog::{CatalogError, CatalogService, LandingCatalog, ServiceForm, ServiceFormMode};
pub use comment::{CommentError, CommentService};
pub use form::{FieldErrors, NON_FIELD};
pub use markdown::MarkdownRenderer;
pub use master::{MasterPage, MasterService};
pub use moderation::{ContentModerator, MistralModerator, ModerationVerdict};
pub use notifier::{OrderNotifier, TelegramNotifier};
pub use order::{OrderError, OrderForm, OrderService};
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use review::{ReviewError, ReviewForm, ReviewService};
pub use slug::slugify;
pub use upload::{MediaStore, UploadError, UploadedFile};
pub use user::{PasswordChangeForm, ProfileForm, RegisterForm, UserService, UserServiceError};
pub use visitor::{FlashLevel, FlashMessage, VisitorStore};
