//! Data models
//!
//! Database entities, validated inputs and the view structs handed to
//! templates and JSON responses.

mod blog;
mod comment;
mod master;
mod order;
mod pagination;
mod review;
mod service;
mod session;
mod user;

pub use blog::{Category, CategoryInput, Post, PostDetail, PostInput, Tag, TagInput};
pub use comment::{Comment, CommentWithMeta, LikeTargetType};
pub use master::{rating_stars, Master, MasterInput, MasterProfile, MasterWithRating, RatingBucket};
pub use order::{
    CreateOrderInput, Order, OrderDetail, OrderSearch, OrderSearchField, OrderStatus,
};
pub use pagination::{ListParams, PageInfo, PagedResult};
pub use review::{CreateReviewInput, Review, ReviewWithMaster};
pub use service::{parse_price, price_from_cents, price_to_cents, PriceError, Service, ServiceInput};
pub use session::Session;
pub use user::{UpdateProfileInput, User, UserRole};
