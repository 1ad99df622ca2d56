pub mod addresses;
pub mod audit_logs;
pub mod cart_items;
pub mod carts;
pub mod categories;
pub mod order_items;
pub mod orders;
pub mod products;
pub mod review_images;
pub mod review_likes;
pub mod reviews;
pub mod roles;
pub mod user_roles;
pub mod users;
pub mod wishlist;

pub use addresses::Entity as Addresses;
pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use categories::Entity as Categories;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use review_images::Entity as ReviewImages;
pub use review_likes::Entity as ReviewLikes;
pub use reviews::Entity as Reviews;
pub use roles::Entity as Roles;
pub use user_roles::Entity as UserRoles;
pub use users::Entity as Users;
pub use wishlist::Entity as Wishlist;
